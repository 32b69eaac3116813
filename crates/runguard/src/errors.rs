use miette::Diagnostic;
use serde_json::Value;
use std::fmt;

use crate::model::ErrorInfo;

pub type GuardResult<T> = Result<T, GuardError>;

/// Library-wide error carrying a stable machine code, a human message, and
/// optional structured context for diagnostics.
#[derive(Debug)]
pub struct GuardError {
    pub code: String,
    pub message: String,
    pub context: Option<Value>,
}

impl GuardError {
    pub fn config(
        code: impl Into<String>,
        message: impl Into<String>,
        context: impl Into<Option<Value>>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn policy_denied(
        code: impl Into<String>,
        message: impl Into<String>,
        context: impl Into<Option<Value>>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn io(
        code: impl Into<String>,
        message: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: Some(serde_json::json!({ "source": err.to_string() })),
        }
    }

    pub fn spawn(message: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self {
            code: "E_SPAWN".to_string(),
            message: message.into(),
            context: Some(serde_json::json!({ "source": err.to_string() })),
        }
    }

    pub fn cli_invalid_arg(message: impl Into<String>) -> Self {
        Self {
            code: "E_CLI_INVALID_ARG".to_string(),
            message: message.into(),
            context: None,
        }
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code.clone(),
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }

    /// Process exit code this error maps to when it reaches the CLI surface.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        ErrorCode::parse(&self.code).map_or(1, ErrorCode::exit_code)
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl Diagnostic for GuardError {}

/// Known error codes and their CLI exit-code mapping.
///
/// Policy denial and malformed invocations share the usage-error status (2);
/// everything that goes wrong after the gate maps to the generic error
/// status (1).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    Config,
    PolicyDenied,
    CliInvalidArg,
    Spawn,
    Io,
    BudgetExceeded,
    Canceled,
    Internal,
}

impl ErrorCode {
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "E_CONFIG" => Some(Self::Config),
            "E_POLICY_DENIED" => Some(Self::PolicyDenied),
            "E_CLI_INVALID_ARG" => Some(Self::CliInvalidArg),
            "E_SPAWN" => Some(Self::Spawn),
            "E_IO" => Some(Self::Io),
            "E_BUDGET_EXCEEDED" => Some(Self::BudgetExceeded),
            "E_CANCELED" => Some(Self::Canceled),
            "E_INTERNAL" => Some(Self::Internal),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "E_CONFIG",
            Self::PolicyDenied => "E_POLICY_DENIED",
            Self::CliInvalidArg => "E_CLI_INVALID_ARG",
            Self::Spawn => "E_SPAWN",
            Self::Io => "E_IO",
            Self::BudgetExceeded => "E_BUDGET_EXCEEDED",
            Self::Canceled => "E_CANCELED",
            Self::Internal => "E_INTERNAL",
        }
    }

    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Config | Self::PolicyDenied | Self::CliInvalidArg => 2,
            Self::Spawn | Self::Io | Self::BudgetExceeded | Self::Canceled | Self::Internal => 1,
        }
    }
}
