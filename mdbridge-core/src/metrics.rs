// ABOUTME: Counter helpers for the bridge, recorded through the metrics facade.
// ABOUTME: No-ops unless the embedding process installs a recorder.

use metrics::counter;

pub fn record_event(kind: &str) {
    counter!("mdbridge_events_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("mdbridge_cache_lookups_total", "result" => result).increment(1);
}

/// Outcome is one of queued, dropped, fetched, unchanged, failed
pub fn record_avatar(outcome: &'static str) {
    counter!("mdbridge_avatar_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_send(outcome: &'static str) {
    counter!("mdbridge_sends_total", "outcome" => outcome).increment(1);
}

pub fn record_host_error(severity: &'static str) {
    counter!("mdbridge_host_errors_total", "severity" => severity).increment(1);
}
