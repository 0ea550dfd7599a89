//! Result of one header filter invocation

use crate::error::FrameworkError;
use headerhook_core::{FilterStatus, StatusCode};

/// Outcome of one invocation, produced exactly once
#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    /// The script ran to completion
    Success,
    /// The script raised a fault; carries its message
    ScriptFault(String),
    /// The hook machinery failed before or around the script
    FrameworkError(FrameworkError),
}

impl InvocationOutcome {
    /// Whether the script completed
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Status to abort the request with, `None` on success
    pub fn abort_status(&self) -> Option<StatusCode> {
        match self {
            Self::Success => None,
            Self::ScriptFault(_) => Some(StatusCode::INTERNAL_SERVER_ERROR),
            Self::FrameworkError(err) => Some(err.status_code()),
        }
    }

    /// Short label for logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ScriptFault(_) => "script_fault",
            Self::FrameworkError(_) => "framework_error",
        }
    }

    /// Host status for a failed outcome
    ///
    /// `None` on success: the caller continues down the chain instead.
    pub fn into_abort(self) -> Option<FilterStatus> {
        self.abort_status().map(FilterStatus::Abort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;

    #[test]
    fn test_abort_status() {
        assert!(InvocationOutcome::Success.abort_status().is_none());
        assert_eq!(
            InvocationOutcome::ScriptFault("x".into()).abort_status(),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
        let err = FrameworkError::from(LoadError::invalid_source("x"));
        assert!(matches!(
            InvocationOutcome::FrameworkError(err).into_abort(),
            Some(FilterStatus::Abort(code)) if code == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }
}
