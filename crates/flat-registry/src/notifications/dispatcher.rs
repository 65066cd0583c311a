use std::sync::Arc;

use tracing::{error, info, info_span, warn, Instrument};

use super::drain::DrainTracker;
use super::sender::{FlatNotice, Notifier};
use crate::records::HouseRepository;

/// Counts gathered for a single fan-out batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Best-effort fan-out of flat notices to a house's subscribers.
///
/// Each dispatch runs on its own detached task that is not tied to the
/// request that triggered it; the shared [`DrainTracker`] is the only handle
/// the process keeps on it.
#[derive(Clone)]
pub struct NotificationDispatcher {
    houses: Arc<dyn HouseRepository>,
    notifier: Arc<dyn Notifier>,
    drain: DrainTracker,
}

impl NotificationDispatcher {
    pub fn new(
        houses: Arc<dyn HouseRepository>,
        notifier: Arc<dyn Notifier>,
        drain: DrainTracker,
    ) -> Self {
        Self {
            houses,
            notifier,
            drain,
        }
    }

    /// Schedules delivery and returns immediately.
    pub fn dispatch(&self, notice: FlatNotice) {
        let guard = self.drain.add();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                error!(
                    house_id = %notice.house_id,
                    error = %err,
                    "no runtime available, notification batch dropped"
                );
                return;
            }
        };

        let houses = Arc::clone(&self.houses);
        let notifier = Arc::clone(&self.notifier);
        let span = info_span!(
            "notification_fan_out",
            house_id = %notice.house_id,
            flat_id = %notice.flat_id
        );

        runtime.spawn(
            async move {
                let _guard = guard;
                fan_out(houses.as_ref(), notifier.as_ref(), &notice).await;
            }
            .instrument(span),
        );
    }
}

/// Sends one notice per current subscriber. Individual failures never stop
/// the remaining deliveries; a failed subscriber lookup abandons the batch.
pub async fn fan_out(
    houses: &dyn HouseRepository,
    notifier: &dyn Notifier,
    notice: &FlatNotice,
) -> FanOutReport {
    let recipients = match houses.subscribers(notice.house_id).await {
        Ok(recipients) => recipients,
        Err(err) => {
            error!(error = %err, "failed to resolve subscribers, batch abandoned");
            return FanOutReport::default();
        }
    };

    let mut report = FanOutReport::default();
    for recipient in &recipients {
        report.attempted += 1;
        match notifier.send(recipient, notice).await {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                report.failed += 1;
                warn!(recipient = %recipient, error = %err, "notification delivery failed");
            }
        }
    }

    info!(
        attempted = report.attempted,
        delivered = report.delivered,
        failed = report.failed,
        "notification batch finished"
    );
    report
}
