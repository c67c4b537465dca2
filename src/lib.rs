pub mod breaker;
pub mod config;
pub mod directory;
pub mod engine;
pub mod existence;
pub mod model;
pub mod observability;
pub mod watcher;

use std::sync::Arc;

use breaker::BreakerRegistry;
use config::Config;
use directory::{Directory, RoomLookup, UserLookup};
use engine::{Engine, MemoryStore};
use existence::{ExistenceChecker, HttpProbe};

/// Everything a running service needs: the engine, the breaker registry
/// for the operator status/reset surface, and the directory replica the
/// deployment seeds and keeps in sync.
pub struct App {
    pub engine: Arc<Engine>,
    pub breakers: Arc<BreakerRegistry>,
    pub directory: Arc<Directory>,
}

/// Wire up the full stack from configuration: one HTTP probe and one
/// circuit breaker per remote dependency, both falling back to the shared
/// local directory.
pub fn bootstrap(config: &Config) -> Result<App, reqwest::Error> {
    let breakers = Arc::new(BreakerRegistry::new());
    let directory = Arc::new(Directory::new());

    let users = ExistenceChecker::new(
        breakers.register("users", config.breaker()),
        Arc::new(HttpProbe::new(
            config.users_service_url.clone(),
            config.probe_timeout,
        )?),
        Arc::new(UserLookup(directory.clone())),
    );
    let rooms = ExistenceChecker::new(
        breakers.register("rooms", config.breaker()),
        Arc::new(HttpProbe::new(
            config.rooms_service_url.clone(),
            config.probe_timeout,
        )?),
        Arc::new(RoomLookup(directory.clone())),
    );

    let engine = Arc::new(Engine::new(Arc::new(MemoryStore::new()), users, rooms));
    Ok(App {
        engine,
        breakers,
        directory,
    })
}
