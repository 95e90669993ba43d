use crate::{
    backtest::{Services, update_one},
    error::FolioError,
    queue::WorkQueue,
    repository::Repository,
};
use chrono::{DateTime, Utc};
use folio_data::Ctx;
use tracing::{info, warn};

/// Outcome counts of one queue drain.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct WorkerReport {
    pub processed: usize,
    pub failed: usize,
}

/// Drain the work queue, extending each requested portfolio through
/// `through`.
///
/// Every message runs under its own repository transaction and is
/// acknowledged only after that transaction commits. A failed message stays
/// unacknowledged (the queue redelivers it) and does not abort the drain;
/// only queue transport errors and cancellation surface.
pub async fn run_worker(
    ctx: &Ctx,
    services: &Services<'_>,
    repository: &dyn Repository,
    queue: &dyn WorkQueue,
    through: DateTime<Utc>,
) -> Result<WorkerReport, FolioError> {
    let mut report = WorkerReport::default();

    while let Some(delivery) = queue.receive(ctx).await? {
        match update_one(
            ctx,
            services,
            repository,
            &delivery.request.user_id,
            delivery.request.portfolio_id,
            through,
        )
        .await
        {
            Ok(()) => {
                queue.ack(ctx, &delivery.ack_id).await?;
                report.processed += 1;
            }
            Err(err) => {
                warn!(
                    portfolio_id = %delivery.request.portfolio_id,
                    %err,
                    "simulation request failed; leaving unacknowledged"
                );
                report.failed += 1;
            }
        }
    }

    info!(
        processed = report.processed,
        failed = report.failed,
        "work queue drained"
    );
    Ok(report)
}
