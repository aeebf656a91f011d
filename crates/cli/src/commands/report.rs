use std::sync::Arc;

use sitespend_core::clock::{Clock, SystemClock};
use sitespend_core::errors::WorkflowError;
use sitespend_core::reporting::DailySpending;
use sitespend_core::workflow::WorkflowService;
use sitespend_db::SqlWorkflowStore;

use crate::commands::{
    connect, prepare, CommandResult, StepFailure, EXIT_EXECUTION, EXIT_VERIFICATION,
};

/// Prints the daily spending report as the outcome's `message` object.
/// The schema is read as-is; `migrate` owns schema changes.
pub fn daily_spending(date: Option<&str>) -> CommandResult {
    daily_spending_with_clock(date, Arc::new(SystemClock))
}

pub fn daily_spending_with_clock(date: Option<&str>, clock: Arc<dyn Clock>) -> CommandResult {
    let (config, runtime) = match prepare("report") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        let service = WorkflowService::new(
            SqlWorkflowStore::new(pool.clone()),
            clock,
            config.reporting.timezone,
        );
        let report = service.daily_spending(date).await.map_err(step_failure);
        pool.close().await;
        report
    });

    match result.and_then(|report| to_value(&report)) {
        Ok(payload) => CommandResult::success_with("report", payload),
        Err(failure) => CommandResult::from_step("report", failure),
    }
}

fn step_failure(error: WorkflowError) -> StepFailure {
    match error {
        WorkflowError::InvalidDate { .. } => ("invalid_input", error.to_string(), EXIT_VERIFICATION),
        other => ("report_execution", other.to_string(), EXIT_EXECUTION),
    }
}

fn to_value(report: &DailySpending) -> Result<serde_json::Value, StepFailure> {
    serde_json::to_value(report)
        .map_err(|error| ("serialization", error.to_string(), EXIT_EXECUTION))
}

#[cfg(test)]
mod tests {
    use sitespend_core::errors::WorkflowError;

    use super::step_failure;

    #[test]
    fn invalid_dates_are_input_failures() {
        let (class, message, code) =
            step_failure(WorkflowError::InvalidDate { value: "2026-13-01".to_string() });

        assert_eq!(class, "invalid_input");
        assert!(message.contains("2026-13-01"));
        assert_eq!(code, 6);
    }

    #[test]
    fn storage_failures_are_execution_failures() {
        let (class, _, code) = step_failure(WorkflowError::Storage("locked".to_string()));

        assert_eq!(class, "report_execution");
        assert_eq!(code, 5);
    }
}
