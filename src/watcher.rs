use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;
use crate::observability;

/// Background task that periodically sweeps for stuck bookings: confirmed
/// rows whose window has elapsed without being completed or cancelled.
/// The watcher only reports. Finalizing a stuck booking is an explicit
/// operator decision through [`Engine::unblock`].
pub async fn run_watcher(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match engine.find_stuck().await {
            Ok(stuck) => {
                metrics::gauge!(observability::STUCK_BOOKINGS).set(stuck.len() as f64);
                for b in &stuck {
                    tracing::warn!(
                        booking = %b.id,
                        room = b.room_id,
                        user = b.user_id,
                        date = %b.date,
                        "stuck booking: confirmed window elapsed"
                    );
                }
            }
            Err(e) => {
                tracing::error!("stuck booking sweep failed: {e}");
            }
        }
    }
}
