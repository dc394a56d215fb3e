// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_gauge};

/// Register all Pendo metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "pendo_conversations_created_total",
        "Conversations opened by students"
    );
    describe_counter!(
        "pendo_messages_total",
        "Messages appended to conversation logs"
    );
    describe_counter!("pendo_claims_total", "Claim attempts by outcome");
    describe_counter!("pendo_escalations_total", "Risk escalations applied");
    describe_gauge!("pendo_queue_depth", "Conversations awaiting a counsellor");
}

/// Record a newly created conversation.
pub fn record_conversation_created() {
    metrics::counter!("pendo_conversations_created_total").increment(1);
}

/// Record an appended message.
pub fn record_message(role: &str) {
    metrics::counter!("pendo_messages_total", "role" => role.to_string()).increment(1);
}

/// Record a claim attempt ("won" or "lost").
pub fn record_claim(outcome: &'static str) {
    metrics::counter!("pendo_claims_total", "outcome" => outcome).increment(1);
}

/// Record an applied escalation.
pub fn record_escalation(level: &str) {
    metrics::counter!("pendo_escalations_total", "level" => level.to_string()).increment(1);
}

/// Set the current queue depth.
pub fn set_queue_depth(depth: f64) {
    metrics::gauge!("pendo_queue_depth").set(depth);
}
