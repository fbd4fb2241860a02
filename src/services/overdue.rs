//! Periodic scan for rentals due back imminently.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::services::notifier::{send_best_effort, Notifier};
use crate::storage::RentalStore;

const NONE_OVERDUE_MESSAGE: &str = "No rentals overdue today or tomorrow!";

pub struct OverdueScanner {
    rentals: Arc<dyn RentalStore>,
    notifier: Arc<dyn Notifier>,
}

impl OverdueScanner {
    pub fn new(rentals: Arc<dyn RentalStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { rentals, notifier }
    }

    /// One pass over the look-ahead window (today through tomorrow,
    /// inclusive): a notice per rental still ACTIVE and due back, or a
    /// single all-clear notice. Notification failures never abort the scan.
    pub async fn scan_once(&self) -> Result<usize> {
        let today = Utc::now().date_naive();
        let tomorrow = today + Days::new(1);

        let due = self.rentals.find_due_between(today, tomorrow).await?;

        if due.is_empty() {
            send_best_effort(self.notifier.as_ref(), NONE_OVERDUE_MESSAGE).await;
            tracing::debug!("no overdue rentals in window");
            return Ok(0);
        }

        for rental in &due {
            send_best_effort(
                self.notifier.as_ref(),
                &format!("Overdue rental:\n\n{rental}"),
            )
            .await;
        }

        tracing::info!(count = due.len(), "overdue rentals notified");
        Ok(due.len())
    }

    /// Scan loop for the daemon. Ticks immediately on start, then every
    /// `period`; a failed scan is logged and the schedule keeps going.
    pub async fn run(&self, period: Duration, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("overdue scanner shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.scan_once().await {
                        tracing::error!(error = %err, "overdue scan failed");
                    }
                }
            }
        }
    }
}
