//! Metric name constants.

/// Active conversation sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Sessions ended by idle timeout (counter).
pub const SESSIONS_REAPED_TOTAL: &str = "sessions_reaped_total";
/// Generated turns (counter, labels: outcome).
pub const TURNS_TOTAL: &str = "turns_total";
/// Generation calls currently in flight (gauge).
pub const TURNS_IN_FLIGHT: &str = "turns_in_flight";
/// Generation failures (counter, labels: kind).
pub const GENERATION_FAILURES_TOTAL: &str = "generation_failures_total";
/// Commands handed to the executor (counter, labels: outcome).
pub const COMMANDS_EXECUTED_TOTAL: &str = "commands_executed_total";
/// Commands dropped by the allow-list (counter).
pub const COMMANDS_REJECTED_TOTAL: &str = "commands_rejected_total";
/// Generated turns dropped because their session ended (counter).
pub const TURNS_DISCARDED_TOTAL: &str = "turns_discarded_total";
