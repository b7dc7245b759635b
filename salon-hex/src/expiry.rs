//! Background expiry of overdue sessions.
//!
//! Each sweep moves up to a batch of sessions past their expiry to
//! `expired` and prunes idle session locks. Sweep errors are logged and the
//! loop carries on.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, instrument};

use salon_types::SalonRepository;

use crate::service::SessionService;

/// Sessions expired per sweep.
const SWEEP_BATCH: i64 = 100;

/// Background sweep moving overdue sessions to `expired`.
pub struct ExpiryWorker<R: SalonRepository> {
    service: Arc<SessionService<R>>,
    interval: Duration,
}

impl<R: SalonRepository> ExpiryWorker<R> {
    pub fn new(service: Arc<SessionService<R>>, interval: Duration) -> Self {
        Self { service, interval }
    }

    #[instrument(skip(self))]
    pub async fn run(self) {
        info!("Starting session expiry worker every {:?}", self.interval);
        loop {
            self.sweep().await;
            sleep(self.interval).await;
        }
    }

    /// One pass; drains full batches before going back to sleep.
    pub async fn sweep(&self) -> usize {
        let mut total = 0;
        loop {
            match self.service.expire_stale_sessions(SWEEP_BATCH).await {
                Ok(count) => {
                    total += count;
                    if (count as i64) < SWEEP_BATCH {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to expire sessions: {}", e);
                    break;
                }
            }
        }
        total
    }
}
