//! Metric names and recording helpers
//!
//! Everything goes through the `metrics` facade. With no recorder
//! installed the calls are no-ops, so library users pay nothing unless the
//! host process wires an exporter.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::Once;
use std::time::Duration;

pub const PROVIDER_ATTEMPTS: &str = "wxnotify_provider_attempts_total";
pub const BREAKER_TRANSITIONS: &str = "wxnotify_breaker_transitions_total";
pub const CACHE_LOOKUPS: &str = "wxnotify_cache_lookups_total";
pub const PUBLISHES: &str = "wxnotify_publishes_total";
pub const SCHEDULER_RUNS: &str = "wxnotify_scheduler_runs_total";
pub const SUBSCRIBER_OUTCOMES: &str = "wxnotify_subscriber_outcomes_total";
pub const DELIVERIES: &str = "wxnotify_deliveries_total";
pub const RUN_DURATION: &str = "wxnotify_run_duration_seconds";

/// Register metric descriptions once per process
pub fn describe_metrics() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        describe_counter!(
            PROVIDER_ATTEMPTS,
            "Weather provider calls, labelled by provider and outcome."
        );
        describe_counter!(
            BREAKER_TRANSITIONS,
            "Circuit breaker state changes, labelled by provider and target state."
        );
        describe_counter!(CACHE_LOOKUPS, "Weather cache lookups by result (hit/miss/error).");
        describe_counter!(PUBLISHES, "Delivery intent publishes by outcome.");
        describe_counter!(SCHEDULER_RUNS, "Scheduler runs by frequency and outcome.");
        describe_counter!(
            SUBSCRIBER_OUTCOMES,
            "Per-subscriber results within a run (published/failed)."
        );
        describe_counter!(DELIVERIES, "Consumed messages by acknowledgement.");
        describe_histogram!(RUN_DURATION, "Wall time of one scheduler run in seconds.");
    });
}

pub(crate) fn provider_attempt(provider: &str, outcome: &'static str) {
    counter!(PROVIDER_ATTEMPTS, "provider" => provider.to_string(), "outcome" => outcome)
        .increment(1);
}

pub(crate) fn breaker_transition(provider: &str, to: &'static str) {
    counter!(BREAKER_TRANSITIONS, "provider" => provider.to_string(), "to" => to).increment(1);
}

pub(crate) fn cache_lookup(result: &'static str) {
    counter!(CACHE_LOOKUPS, "result" => result).increment(1);
}

pub(crate) fn publish(outcome: &'static str) {
    counter!(PUBLISHES, "outcome" => outcome).increment(1);
}

pub(crate) fn scheduler_run(frequency: &'static str, outcome: &'static str) {
    counter!(SCHEDULER_RUNS, "frequency" => frequency, "outcome" => outcome).increment(1);
}

pub(crate) fn subscriber_outcome(frequency: &'static str, outcome: &'static str) {
    counter!(SUBSCRIBER_OUTCOMES, "frequency" => frequency, "outcome" => outcome).increment(1);
}

pub(crate) fn delivery(ack: &'static str) {
    counter!(DELIVERIES, "ack" => ack).increment(1);
}

pub(crate) fn run_duration(frequency: &'static str, elapsed: Duration) {
    histogram!(RUN_DURATION, "frequency" => frequency).record(elapsed.as_secs_f64());
}
