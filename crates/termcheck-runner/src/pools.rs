use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};
use termcheck_core::{CheckType, RuleParameters, ValidationError, ValidationRule};
use termcheck_queue::{AggregationQueue, TaskTracker, ValidationBatch};
use termcheck_rules::{EvalContext, EvaluatorRegistry, RuleEvaluator};
use tracing::{debug, warn};

use crate::PoolsConfig;

/// One bounded worker pool per check type, so slow rules cannot starve fast ones.
pub struct ValidationPools {
    pools: HashMap<CheckType, ThreadPool>,
}

struct Job {
    check_type: CheckType,
    rule: ValidationRule,
    evaluator: Arc<dyn RuleEvaluator>,
}

impl ValidationPools {
    pub fn new(cfg: &PoolsConfig) -> Result<Self, ValidationError> {
        let mut pools = HashMap::new();
        for ct in CheckType::ALL {
            let pool = ThreadPoolBuilder::new()
                .num_threads(cfg.threads_for(ct))
                .thread_name(move |i| format!("termcheck-{ct}-{i}"))
                .build()
                .map_err(|e| ValidationError::Pool(e.to_string()))?;
            pools.insert(ct, pool);
        }
        Ok(Self { pools })
    }

    pub fn threads(&self, check_type: CheckType) -> usize {
        self.pools.get(&check_type).map_or(0, ThreadPool::current_num_threads)
    }

    /// Submit one evaluation task per rule that has a registered evaluator.
    ///
    /// Every rule must declare a check type; this is verified for the whole set
    /// before anything is submitted. Rules whose evaluator type is unknown are
    /// skipped. Returns the number of submitted tasks.
    pub fn schedule(
        &self,
        rules: &[ValidationRule],
        registry: &EvaluatorRegistry,
        ctx: &Arc<EvalContext>,
        params: &Arc<RuleParameters>,
        queue: &AggregationQueue,
        tracker: &TaskTracker,
    ) -> Result<usize, ValidationError> {
        let mut jobs = Vec::with_capacity(rules.len());
        for rule in rules {
            let check_type = rule.check_type.ok_or_else(|| ValidationError::MissingCheckType(rule.id.clone()))?;
            match registry.get(&rule.evaluator_type) {
                Some(evaluator) => jobs.push(Job {
                    check_type,
                    rule: rule.clone(),
                    evaluator,
                }),
                None => debug!(rule_id = %rule.id, evaluator_type = %rule.evaluator_type, "no evaluator registered; skipping rule"),
            }
        }

        let submitted = jobs.len();
        for job in jobs {
            let Some(pool) = self.pools.get(&job.check_type) else {
                return Err(ValidationError::Pool(format!("no pool for check type {}", job.check_type)));
            };
            let guard = tracker.start();
            let producer = queue.producer();
            let ctx = Arc::clone(ctx);
            let params = Arc::clone(params);
            pool.spawn(move || {
                let _guard = guard;
                let Job { rule, evaluator, .. } = job;
                let started = Instant::now();
                let outcome = catch_unwind(AssertUnwindSafe(|| evaluator.eval(&ctx, &rule, &params)));
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match outcome {
                    Ok(Ok(findings)) => {
                        debug!(rule_id = %rule.id, findings = findings.len(), elapsed_ms, "rule evaluated");
                        producer.push(ValidationBatch {
                            rule_id: rule.id,
                            findings,
                        });
                    }
                    Ok(Err(e)) => {
                        warn!(rule_id = %rule.id, elapsed_ms, error = %e, "rule evaluation failed; rule skipped for this run");
                    }
                    Err(_) => {
                        warn!(rule_id = %rule.id, elapsed_ms, "rule evaluator panicked; rule skipped for this run");
                    }
                }
            });
        }
        Ok(submitted)
    }
}
