use crate::analysis::AnalysisService;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawns the periodic AI analysis over every opportunity.
///
/// The first run happens one full `period` after start-up. A failed run is
/// logged and the next tick runs as usual.
pub fn spawn_analysis_scheduler(service: AnalysisService, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("AI analysis scheduler started (every {:?})", period);
        loop {
            ticker.tick().await;
            match service.run_scheduled().await {
                Ok(summary) => tracing::info!(
                    "Scheduled AI analysis {} done: {} segmented, {} scored, {} gifts suggested",
                    summary.run_id,
                    summary.segmented,
                    summary.scored,
                    summary.gifts_suggested
                ),
                Err(e) => tracing::error!("Scheduled AI analysis failed: {}", e),
            }
        }
    })
}
