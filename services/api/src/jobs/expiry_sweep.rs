//! Scheduled persistence of lazy expiry
//!
//! Reads already report elapsed codes as expired; the sweep only brings the
//! stored status in line so listings and reports stay cheap.

use access::services::AccessCodeService;
use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Start the sweep on `schedule` (cron with seconds). The returned scheduler
/// must be kept alive for the job to keep running.
pub async fn start_expiry_sweep(codes: AccessCodeService, schedule: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_, _| {
        let codes = codes.clone();
        Box::pin(async move {
            match codes.sweep_expired().await {
                Ok(0) => {}
                Ok(expired) => info!("Expiry sweep marked {} access codes expired", expired),
                Err(e) => error!("Expiry sweep failed: {}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!("Started expiry sweep with schedule: {}", schedule);
    Ok(scheduler)
}
