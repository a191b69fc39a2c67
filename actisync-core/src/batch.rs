//! Deferred calendar mutations, applied in batches per destination.

use std::collections::VecDeque;
use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;

use crate::destination::Destination;
use crate::error::SyncResult;
use crate::event::{DestinationEvent, EventUpdate};
use crate::record::CanonicalRecord;
use crate::report::ErrorReporter;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            OperationKind::Create => "+",
            OperationKind::Update => "~",
            OperationKind::Delete => "-",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A mutation decided during a pass, carrying its target and desired state.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOperation {
    Create(CanonicalRecord),
    Update {
        event: DestinationEvent,
        update: EventUpdate,
    },
    Delete(DestinationEvent),
}

impl PendingOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            PendingOperation::Create(_) => OperationKind::Create,
            PendingOperation::Update { .. } => OperationKind::Update,
            PendingOperation::Delete(_) => OperationKind::Delete,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            PendingOperation::Create(record) => &record.title,
            PendingOperation::Update { update, .. } => &update.title,
            PendingOperation::Delete(event) => &event.title,
        }
    }

    async fn apply<D: Destination>(&self, destination: &D) -> SyncResult<()> {
        match self {
            PendingOperation::Create(record) => {
                destination.create(record).await?;
                tracing::info!("Created event: {}", record.title);
            }
            PendingOperation::Update { event, update } => {
                destination.update(event, update).await?;
                tracing::info!("Updated event: {}", update.title);
            }
            PendingOperation::Delete(event) => {
                destination.delete(event).await?;
                tracing::info!("Deleted orphaned event: {}", event.title);
            }
        }
        Ok(())
    }
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.title())
    }
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub applied: usize,
    pub failed: usize,
    /// Operations dropped without being applied (dry run).
    pub discarded: usize,
}

impl AddAssign for FlushSummary {
    fn add_assign(&mut self, other: FlushSummary) {
        self.applied += other.applied;
        self.failed += other.failed;
        self.discarded += other.discarded;
    }
}

/// FIFO queue of pending operations for one destination.
///
/// Reaching the threshold flushes synchronously inside [`Batcher::enqueue`].
/// Nothing is flushed implicitly on drop: the owner calls [`Batcher::flush`]
/// at the end of a pass.
pub struct Batcher {
    queue: VecDeque<PendingOperation>,
    threshold: usize,
    dry_run: bool,
    retry: RetryPolicy,
    reporter: Arc<ErrorReporter>,
    totals: FlushSummary,
}

impl Batcher {
    pub fn new(
        threshold: usize,
        dry_run: bool,
        retry: RetryPolicy,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Batcher {
            queue: VecDeque::new(),
            threshold: threshold.max(1),
            dry_run,
            retry,
            reporter,
            totals: FlushSummary::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Everything flushed by this batcher so far.
    pub fn totals(&self) -> FlushSummary {
        self.totals
    }

    /// Queue `operation`, flushing when the threshold is reached.
    pub async fn enqueue<D: Destination>(
        &mut self,
        operation: PendingOperation,
        destination: &D,
    ) -> Option<FlushSummary> {
        tracing::debug!("Queued {} for {}", operation, destination.id());
        self.queue.push_back(operation);

        if self.queue.len() >= self.threshold {
            Some(self.flush(destination).await)
        } else {
            None
        }
    }

    /// Apply every queued operation in order.
    ///
    /// A failing operation is recorded as "Batch operation i/N" and the
    /// remaining operations still run. In dry-run mode the queue is discarded.
    pub async fn flush<D: Destination>(&mut self, destination: &D) -> FlushSummary {
        let operations: Vec<PendingOperation> = self.queue.drain(..).collect();
        let total = operations.len();
        let mut summary = FlushSummary::default();

        if self.dry_run {
            tracing::info!("[DRY RUN] Would execute {} operations", total);
            for operation in &operations {
                tracing::debug!("[DRY RUN] {}", operation);
            }
            summary.discarded = total;
            self.totals += summary;
            return summary;
        }

        for (index, operation) in operations.iter().enumerate() {
            match self.retry.run(|| operation.apply(destination)).await {
                Ok(()) => summary.applied += 1,
                Err(e) => {
                    summary.failed += 1;
                    self.reporter
                        .record(format!("Batch operation {}/{}", index + 1, total), &e);
                }
            }
        }

        self.totals += summary;
        summary
    }
}
