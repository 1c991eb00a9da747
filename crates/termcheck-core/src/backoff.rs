use std::time::Duration;

/// Drain-loop poll delay: grows with the number of selected rules, capped at `ceiling`.
///
/// Any monotonic bounded backoff works here; this one trades latency on small
/// rule sets against wakeups on large ones.
pub fn poll_delay(rule_count: usize, unit: Duration, ceiling: Duration) -> Duration {
    let factor = u32::try_from(rule_count.max(1)).unwrap_or(u32::MAX);
    unit.checked_mul(factor).map_or(ceiling, |d| d.min(ceiling))
}
