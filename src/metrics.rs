use ::metrics::{counter, histogram};
use tracing::trace;

// Each event goes to the `metrics` facade, rendered at `/metrics` by the
// Prometheus recorder installed in main, and to a trace record.

pub fn inc_requests(route: &'static str) {
    counter!("photomatch_requests_total", "route" => route).increment(1);
    trace!(
        target = "photomatch.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    histogram!("photomatch_stage_duration_ms", "stage" => stage).record(elapsed_ms as f64);
    trace!(
        target = "photomatch.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn fallback_used(reason: &'static str) {
    counter!("photomatch_fallback_total", "reason" => reason).increment(1);
    trace!(
        target = "photomatch.metrics",
        reason = reason,
        "fallback_total_inc"
    );
}

pub fn cleanup_attempts(attempts: u32, succeeded: bool) {
    let outcome = if succeeded { "deleted" } else { "failed" };
    counter!("photomatch_cleanup_total", "outcome" => outcome).increment(1);
    histogram!("photomatch_cleanup_attempts").record(f64::from(attempts));
    trace!(
        target = "photomatch.metrics",
        attempts = attempts,
        succeeded = succeeded,
        "cleanup_attempts"
    );
}
