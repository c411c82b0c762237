//! Concord Telemetry
//!
//! Audit trail and metrics for Concord.
//!
//! Provides:
//! - Hash-chained audit trails for rollout changes
//! - Cohort and engine metrics for canary monitoring

pub mod audit;
pub mod metrics;

pub use audit::{verify_chain, AuditEvent, AuditSeverity, AuditTrail, ChainBreak};
pub use metrics::{CohortMetrics, CohortStats, MetricsCollector, StageAssignments};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditEvent, AuditTrail};
    pub use crate::metrics::{CohortMetrics, MetricsCollector};
}
