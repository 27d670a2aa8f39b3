//! Callback traits for progress reporting and confirmation
//!
//! These let the engine run without depending on a terminal: the CLI plugs
//! in spinners and prompts, tests plug in the no-op implementations.

use mirror::MirrorReport;

use crate::error::Result;
use crate::planner::MirrorOperation;
use crate::types::Direction;

/// Progress callback for plan execution
pub trait ProgressCallback {
    /// Called once before the first operation
    fn on_plan_start(&mut self, direction: Direction, count: usize);

    fn on_operation_start(&mut self, operation: &MirrorOperation);

    fn on_operation_complete(&mut self, operation: &MirrorOperation, report: &MirrorReport);

    fn on_operation_failed(&mut self, operation: &MirrorOperation, error: &mirror::Error);

    /// Called after the last operation succeeded
    fn on_plan_complete(&mut self);
}

/// Confirmation callback for guarded actions
pub trait ConfirmCallback {
    /// Ask the user to confirm an action.
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_plan_start(&mut self, _direction: Direction, _count: usize) {}
    fn on_operation_start(&mut self, _operation: &MirrorOperation) {}
    fn on_operation_complete(&mut self, _operation: &MirrorOperation, _report: &MirrorReport) {}
    fn on_operation_failed(&mut self, _operation: &MirrorOperation, _error: &mirror::Error) {}
    fn on_plan_complete(&mut self) {}
}

/// Always confirms. Used for non-interactive runs.
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        log::info!("auto-confirming: {prompt}");
        Ok(true)
    }
}

/// Always declines
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
