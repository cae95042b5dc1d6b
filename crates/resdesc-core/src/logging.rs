//! Structured logging field names.
//!
//! All crates use these constants for consistent structured logging fields.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Rejected writes, schema problems |
//! | INFO  | Lifecycle events (pool, schema provisioning) |
//! | DEBUG | Per-operation completions |
//! | TRACE | Per-row iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "database", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "schema", "descriptions"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create", "get", "update", "ensure_schema"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Research description id being operated on.
pub const DESCRIPTION_ID: &str = "description_id";

/// Parent research id.
pub const RESEARCH_ID: &str = "research_id";

/// Description kind (`type` column).
pub const DESCRIPTION_KIND: &str = "kind";

/// PostgreSQL schema the table lives in.
pub const DB_SCHEMA: &str = "db_schema";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows returned or written.
pub const RESULT_COUNT: &str = "result_count";

/// Number of validation violations.
pub const VIOLATION_COUNT: &str = "violation_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_unique_snake_case() {
        let fields = [
            SUBSYSTEM,
            COMPONENT,
            OPERATION,
            DESCRIPTION_ID,
            RESEARCH_ID,
            DESCRIPTION_KIND,
            DB_SCHEMA,
            DURATION_MS,
            RESULT_COUNT,
            VIOLATION_COUNT,
            ERROR_MSG,
        ];
        let unique: std::collections::HashSet<_> = fields.iter().collect();
        assert_eq!(unique.len(), fields.len());
        for field in fields {
            assert!(field
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
