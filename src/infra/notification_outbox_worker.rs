use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::application::use_cases::notification::NotificationUseCases;
use crate::domain::entities::notification::NotificationStatus;

const STALE_CHECK_INTERVAL_SECS: u64 = 60;
const BATCH_SIZE: i64 = 50;
const MAX_CONCURRENT_SENDS: usize = 8;

pub async fn run_notification_outbox_loop(
    notification_uc: Arc<NotificationUseCases>,
    poll_interval: Duration,
) {
    let mut delivery_ticker = interval(poll_interval);
    let mut stale_ticker = interval(Duration::from_secs(STALE_CHECK_INTERVAL_SECS));

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_SENDS));

    info!(
        "Notification outbox worker started (polling every {}s, max {} concurrent)",
        poll_interval.as_secs(),
        MAX_CONCURRENT_SENDS
    );

    loop {
        tokio::select! {
            _ = delivery_ticker.tick() => {
                process_batch(&notification_uc, &semaphore).await;
            }
            _ = stale_ticker.tick() => {
                release_stale(&notification_uc).await;
            }
        }
    }
}

/// Claim one batch of due notifications and deliver them concurrently.
///
/// Returns how many rows were claimed.
pub async fn process_batch(
    notification_uc: &Arc<NotificationUseCases>,
    semaphore: &Arc<Semaphore>,
) -> usize {
    let pending = match notification_uc.claim_pending(BATCH_SIZE).await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "Failed to claim pending notifications");
            return 0;
        }
    };

    if pending.is_empty() {
        return 0;
    }

    let claimed = pending.len();
    info!(count = claimed, "Processing notification outbox");

    let mut handles = Vec::with_capacity(claimed);

    for notification in pending {
        let uc = Arc::clone(notification_uc);
        let sem = Arc::clone(semaphore);

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            match uc.deliver(&notification).await {
                Ok(NotificationStatus::Abandoned) => {
                    warn!(notification_id = %notification.id, "Notification abandoned");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(
                        notification_id = %notification.id,
                        error = %e,
                        "Failed to record notification result"
                    );
                }
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Notification delivery task panicked");
        }
    }

    claimed
}

async fn release_stale(notification_uc: &NotificationUseCases) {
    match notification_uc.release_stale().await {
        Ok(count) if count > 0 => {
            warn!(count, "Released stale notification locks");
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, "Failed to release stale notification locks");
        }
    }
}
