use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{never, select, Receiver};
use parking_lot::Mutex;
use termcheck_core::{poll_delay, ResultId, RunDescriptor, ValidateRequest, ValidationError};
use termcheck_queue::{AggregationQueue, TaskTracker};
use termcheck_rules::{EvalContext, EvaluatorRegistry, ExtensionRegistry, RuleCatalog, RuleFilter};
use termcheck_storage::{IssueStore, WhitelistIndex};
use tracing::{debug, info};

use crate::{CycleStats, PollingConfig, Reconciler, ValidationPools};

/// Runs validation requests: fans rule evaluations out over the worker pools
/// and reconciles their findings on the calling thread.
///
/// The issue store stages writes store-wide, so runs on one service are
/// serialized: a concurrent `validate` blocks until the current run returns.
/// Services must not share an issue store.
pub struct ValidationService {
    catalog: Arc<dyn RuleCatalog>,
    evaluators: Arc<EvaluatorRegistry>,
    extensions: Arc<ExtensionRegistry>,
    whitelist: Arc<dyn WhitelistIndex>,
    store: Arc<dyn IssueStore>,
    pools: Arc<ValidationPools>,
    polling: PollingConfig,
    writer: Mutex<()>,
}

#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub selected_rules: usize,
    pub scheduled_rules: usize,
    pub cycles: usize,
    pub totals: CycleStats,
}

impl ValidationService {
    pub fn new(
        catalog: Arc<dyn RuleCatalog>,
        evaluators: Arc<EvaluatorRegistry>,
        extensions: Arc<ExtensionRegistry>,
        whitelist: Arc<dyn WhitelistIndex>,
        store: Arc<dyn IssueStore>,
        pools: Arc<ValidationPools>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            catalog,
            evaluators,
            extensions,
            whitelist,
            store,
            pools,
            polling,
            writer: Mutex::new(()),
        }
    }

    /// Delete every stored issue of `result_id`, outside of any running validation.
    pub fn purge(&self, result_id: &ResultId) -> Result<(), ValidationError> {
        let _writer = self.writer.lock();
        self.store.delete_result(result_id).map_err(ValidationError::Store)?;
        self.store.commit().map_err(ValidationError::Store)
    }

    /// Validate and block until every submitted rule has been reconciled.
    pub fn validate(&self, request: ValidateRequest) -> Result<RunDescriptor, ValidationError> {
        self.validate_with_abort(request, &never()).map(|(descriptor, _)| descriptor)
    }

    /// Like [`validate`](Self::validate), but a message on `abort` while the
    /// drain loop is waiting fails the run with [`ValidationError::Interrupted`].
    /// Cycles committed before the abort stay committed.
    pub fn validate_with_abort(
        &self,
        request: ValidateRequest,
        abort: &Receiver<()>,
    ) -> Result<(RunDescriptor, RunSummary), ValidationError> {
        let _writer = self.writer.lock();
        let started = Instant::now();
        let ValidateRequest {
            result_id,
            resource_uri,
            rule_ids,
            rule_parameters,
        } = request;

        let rules = self.catalog.search(&RuleFilter::by_ids(rule_ids))?;
        let selected_ids: BTreeSet<_> = rules.iter().map(|r| r.id.clone()).collect();
        let mut whitelist = self.whitelist.search(&selected_ids).map_err(ValidationError::Store)?;
        info!(
            result_id = %result_id,
            resource = %resource_uri,
            rules = rules.len(),
            catalog = %self.catalog.fingerprint(),
            "validation run started"
        );

        let ctx = Arc::new(EvalContext {
            result_id: result_id.clone(),
            resource_uri: resource_uri.clone(),
        });
        let params = Arc::new(rule_parameters);
        let queue = AggregationQueue::new();
        let tracker = TaskTracker::new();
        let scheduled = self.pools.schedule(&rules, &self.evaluators, &ctx, &params, &queue, &tracker)?;

        let rules_by_id: HashMap<_, _> = rules.into_iter().map(|r| (r.id.clone(), r)).collect();
        let reconciler = Reconciler {
            ctx: &ctx,
            params: &params,
            rules: &rules_by_id,
            store: self.store.as_ref(),
            extensions: &self.extensions,
        };

        let delay = poll_delay(rules_by_id.len(), self.polling.unit(), self.polling.ceiling());
        let mut summary = RunSummary {
            selected_rules: rules_by_id.len(),
            scheduled_rules: scheduled,
            ..RunSummary::default()
        };

        loop {
            // Read before draining: producers push before releasing their guard,
            // so an idle tracker means the drain below sees every batch.
            let finished = tracker.is_idle();
            let batches = queue.drain();
            if !batches.is_empty() {
                let stats = reconciler.run_cycle(batches, &mut whitelist)?;
                summary.cycles += 1;
                summary.totals.absorb(stats);
                continue;
            }
            if finished {
                break;
            }
            debug!(outstanding = tracker.outstanding(), delay_ms = delay.as_millis() as u64, "waiting for rule results");
            wait(abort, delay)?;
        }

        info!(
            result_id = %result_id,
            cycles = summary.cycles,
            created = summary.totals.created,
            updated = summary.totals.updated,
            deleted = summary.totals.deleted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "validation run finished"
        );
        Ok((
            RunDescriptor {
                result_id,
                branch_path: resource_uri,
            },
            summary,
        ))
    }
}

fn wait(abort: &Receiver<()>, delay: Duration) -> Result<(), ValidationError> {
    select! {
        recv(abort) -> msg => match msg {
            Ok(()) => Err(ValidationError::Interrupted),
            // Dropped sender: nobody can abort anymore, so just sleep out the delay.
            Err(_) => {
                std::thread::sleep(delay);
                Ok(())
            }
        },
        default(delay) => Ok(()),
    }
}
