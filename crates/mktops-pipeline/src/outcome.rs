//! Per-unit and per-run outcome shapes.
//!
//! Batch jobs report one [`UnitOutcome`] per independent unit (an ad account,
//! a company) in the `resultados` array of the job response; the run-level
//! status is derived from the set, never from the first failure.

use serde::Serialize;

/// Outcome of one independent unit within a batch job.
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    /// Human-readable unit identifier (account external id, company slug).
    pub unit: String,
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Success,
    Error,
}

impl UnitOutcome {
    #[must_use]
    pub fn success(unit: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            unit: unit.into(),
            status: UnitStatus::Success,
            error: None,
            detail,
        }
    }

    #[must_use]
    pub fn error(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            status: UnitStatus::Error,
            error: Some(message.into()),
            detail: serde_json::Value::Null,
        }
    }
}

/// Run-level status written to `job_executions.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Error,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Error => "error",
        }
    }
}

/// Derives the run status from unit outcomes: `partial` when successes and
/// failures coexist, `error` only when every unit failed. An empty batch is a
/// success (nothing to do).
#[must_use]
pub fn run_status(outcomes: &[UnitOutcome]) -> RunStatus {
    let errors = outcomes
        .iter()
        .filter(|o| o.status == UnitStatus::Error)
        .count();
    if errors == 0 {
        RunStatus::Success
    } else if errors == outcomes.len() {
        RunStatus::Error
    } else {
        RunStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_outcomes_are_partial() {
        let outcomes = vec![
            UnitOutcome::success("act_1", serde_json::Value::Null),
            UnitOutcome::error("act_2", "token expired"),
            UnitOutcome::success("act_3", serde_json::Value::Null),
        ];
        assert_eq!(run_status(&outcomes), RunStatus::Partial);
    }

    #[test]
    fn all_failures_are_error() {
        let outcomes = vec![
            UnitOutcome::error("act_1", "boom"),
            UnitOutcome::error("act_2", "boom"),
        ];
        assert_eq!(run_status(&outcomes), RunStatus::Error);
    }

    #[test]
    fn empty_batch_is_success() {
        assert_eq!(run_status(&[]), RunStatus::Success);
    }

    #[test]
    fn error_field_omitted_on_success() {
        let json = serde_json::to_value(UnitOutcome::success(
            "act_1",
            serde_json::json!({"campanhas": 3}),
        ))
        .expect("serialize");
        assert!(json.get("error").is_none());
        assert_eq!(json["status"], "success");
    }
}
