use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use termcheck_core::{Finding, RuleId};

/// Findings of one completed rule evaluation.
#[derive(Clone, Debug)]
pub struct ValidationBatch {
    pub rule_id: RuleId,
    pub findings: Vec<Finding>,
}

/// Unbounded multi-producer queue drained by a single consumer.
pub struct AggregationQueue {
    tx: Sender<ValidationBatch>,
    rx: Receiver<ValidationBatch>,
}

impl Default for AggregationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregationQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn producer(&self) -> BatchSender {
        BatchSender { tx: self.tx.clone() }
    }

    /// Take every batch currently available without blocking.
    pub fn drain(&self) -> Vec<ValidationBatch> {
        self.rx.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[derive(Clone)]
pub struct BatchSender {
    tx: Sender<ValidationBatch>,
}

impl BatchSender {
    pub fn push(&self, batch: ValidationBatch) {
        // Send only fails once the queue is gone; nobody is draining by then.
        let _ = self.tx.send(batch);
    }
}

/// Groups drained batches by rule id. Findings of repeated batches for the same
/// rule are concatenated in arrival order.
pub fn group_batches(batches: Vec<ValidationBatch>) -> BTreeMap<RuleId, Vec<Finding>> {
    let mut grouped: BTreeMap<RuleId, Vec<Finding>> = BTreeMap::new();
    for batch in batches {
        grouped.entry(batch.rule_id).or_default().extend(batch.findings);
    }
    grouped
}

/// Counts evaluation tasks that have been submitted but not yet finished.
#[derive(Clone, Default)]
pub struct TaskTracker {
    outstanding: Arc<AtomicUsize>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one task. The task is finished when the returned guard drops,
    /// including by unwinding.
    pub fn start(&self) -> TaskGuard {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }
}

pub struct TaskGuard {
    outstanding: Arc<AtomicUsize>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
