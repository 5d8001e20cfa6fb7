use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Category of an [`ErrorCode`], derived from its numeric prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 1xxx - input validation failures.
    Validation,
    /// 2xxx - failures talking to an external API.
    ExternalApi,
    /// 3xxx - failures inside analytical processing.
    Processing,
    /// 4xxx - configuration problems.
    Configuration,
    /// 5xxx - tool lookup and execution failures.
    ToolExecution,
}

/// Closed set of error codes, numerically partitioned by category.
///
/// Each code carries a stable string identifier ([`ErrorCode::as_str`]) used
/// on the wire, and a default recoverability consulted when an error is
/// constructed without an explicit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation (1xxx)
    InvalidInput,
    MissingParameter,
    InvalidParameterType,
    OutOfRange,
    CircularReference,
    // External API (2xxx)
    ApiRequestFailed,
    ApiRateLimit,
    ApiAuthFailed,
    ApiTimeout,
    ApiServiceUnavailable,
    ApiInvalidResponse,
    // Processing (3xxx)
    CalculationFailed,
    InsufficientData,
    MemoryLimit,
    ConvergenceFailed,
    ProcessingTimeout,
    // Configuration (4xxx)
    ConfigMissing,
    ConfigInvalid,
    // Tool execution (5xxx)
    ToolNotFound,
    ToolExecutionFailed,
    ToolDependencyMissing,
}

impl ErrorCode {
    /// Numeric identifier; the thousands digit encodes the category.
    pub fn numeric(self) -> u16 {
        match self {
            ErrorCode::InvalidInput => 1000,
            ErrorCode::MissingParameter => 1001,
            ErrorCode::InvalidParameterType => 1002,
            ErrorCode::OutOfRange => 1003,
            ErrorCode::CircularReference => 1004,
            ErrorCode::ApiRequestFailed => 2000,
            ErrorCode::ApiRateLimit => 2001,
            ErrorCode::ApiAuthFailed => 2002,
            ErrorCode::ApiTimeout => 2003,
            ErrorCode::ApiServiceUnavailable => 2004,
            ErrorCode::ApiInvalidResponse => 2005,
            ErrorCode::CalculationFailed => 3000,
            ErrorCode::InsufficientData => 3001,
            ErrorCode::MemoryLimit => 3002,
            ErrorCode::ConvergenceFailed => 3003,
            ErrorCode::ProcessingTimeout => 3004,
            ErrorCode::ConfigMissing => 4000,
            ErrorCode::ConfigInvalid => 4001,
            ErrorCode::ToolNotFound => 5000,
            ErrorCode::ToolExecutionFailed => 5001,
            ErrorCode::ToolDependencyMissing => 5002,
        }
    }

    /// Stable string identifier used in wire responses and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::MissingParameter => "MISSING_PARAMETER",
            ErrorCode::InvalidParameterType => "INVALID_PARAMETER_TYPE",
            ErrorCode::OutOfRange => "OUT_OF_RANGE",
            ErrorCode::CircularReference => "CIRCULAR_REFERENCE",
            ErrorCode::ApiRequestFailed => "API_REQUEST_FAILED",
            ErrorCode::ApiRateLimit => "API_RATE_LIMIT",
            ErrorCode::ApiAuthFailed => "API_AUTH_FAILED",
            ErrorCode::ApiTimeout => "API_TIMEOUT",
            ErrorCode::ApiServiceUnavailable => "API_SERVICE_UNAVAILABLE",
            ErrorCode::ApiInvalidResponse => "API_INVALID_RESPONSE",
            ErrorCode::CalculationFailed => "CALCULATION_FAILED",
            ErrorCode::InsufficientData => "INSUFFICIENT_DATA",
            ErrorCode::MemoryLimit => "MEMORY_LIMIT",
            ErrorCode::ConvergenceFailed => "CONVERGENCE_FAILED",
            ErrorCode::ProcessingTimeout => "PROCESSING_TIMEOUT",
            ErrorCode::ConfigMissing => "CONFIG_MISSING",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
            ErrorCode::ToolNotFound => "TOOL_NOT_FOUND",
            ErrorCode::ToolExecutionFailed => "TOOL_EXECUTION_FAILED",
            ErrorCode::ToolDependencyMissing => "TOOL_DEPENDENCY_MISSING",
        }
    }

    /// Maps a stable string identifier back to a code.
    ///
    /// Returns `None` for unknown identifiers; boundaries that must stay
    /// total fall back to [`ErrorCode::ToolExecutionFailed`].
    pub fn parse(s: &str) -> Option<ErrorCode> {
        ALL_CODES.iter().copied().find(|c| c.as_str() == s)
    }

    pub fn category(self) -> ErrorCategory {
        match self.numeric() / 1000 {
            1 => ErrorCategory::Validation,
            2 => ErrorCategory::ExternalApi,
            3 => ErrorCategory::Processing,
            4 => ErrorCategory::Configuration,
            _ => ErrorCategory::ToolExecution,
        }
    }

    /// Default recoverability.
    ///
    /// External-API codes are recoverable except auth and invalid-response;
    /// of the processing codes only the timeout is transient. Everything
    /// else propagates to the caller.
    pub fn default_recoverable(self) -> bool {
        matches!(
            self,
            ErrorCode::ApiRequestFailed
                | ErrorCode::ApiRateLimit
                | ErrorCode::ApiTimeout
                | ErrorCode::ApiServiceUnavailable
                | ErrorCode::ProcessingTimeout
        )
    }
}

const ALL_CODES: [ErrorCode; 21] = [
    ErrorCode::InvalidInput,
    ErrorCode::MissingParameter,
    ErrorCode::InvalidParameterType,
    ErrorCode::OutOfRange,
    ErrorCode::CircularReference,
    ErrorCode::ApiRequestFailed,
    ErrorCode::ApiRateLimit,
    ErrorCode::ApiAuthFailed,
    ErrorCode::ApiTimeout,
    ErrorCode::ApiServiceUnavailable,
    ErrorCode::ApiInvalidResponse,
    ErrorCode::CalculationFailed,
    ErrorCode::InsufficientData,
    ErrorCode::MemoryLimit,
    ErrorCode::ConvergenceFailed,
    ErrorCode::ProcessingTimeout,
    ErrorCode::ConfigMissing,
    ErrorCode::ConfigInvalid,
    ErrorCode::ToolNotFound,
    ErrorCode::ToolExecutionFailed,
    ErrorCode::ToolDependencyMissing,
];

/// The workspace-wide error type.
///
/// Carries everything the resilience layer needs to decide retry behavior
/// without inspecting message text: a code, an explicit recoverable flag,
/// and a structured context map. The creation instant is monotonic so
/// errors can be ordered; the wall-clock timestamp feeds the wire shape.
#[derive(Debug, Clone, Error)]
#[error("{}: {}", .code.as_str(), .message)]
pub struct AnalyticalError {
    code: ErrorCode,
    message: String,
    context: BTreeMap<String, Value>,
    recoverable: bool,
    tool: Option<String>,
    created_at: Instant,
    wall_time: SystemTime,
}

impl AnalyticalError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
            recoverable: code.default_recoverable(),
            tool: None,
            created_at: Instant::now(),
            wall_time: SystemTime::now(),
        }
    }

    /// Validation failure (`INVALID_INPUT`).
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Missing required parameter, with the violating path in context.
    pub fn missing_parameter(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::MissingParameter, format!("missing parameter: {path}"))
            .with_context("path", path)
    }

    /// External-API failure. `code` must be a 2xxx code.
    pub fn api(code: ErrorCode, message: impl Into<String>) -> Self {
        debug_assert_eq!(code.category(), ErrorCategory::ExternalApi);
        Self::new(code, message)
    }

    /// Processing failure. `code` must be a 3xxx code.
    pub fn processing(code: ErrorCode, message: impl Into<String>) -> Self {
        debug_assert_eq!(code.category(), ErrorCategory::Processing);
        Self::new(code, message)
    }

    /// Configuration failure (`CONFIG_INVALID`).
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Unknown tool name (`TOOL_NOT_FOUND`).
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorCode::ToolNotFound, format!("unknown tool: {name}")).with_tool(name)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// HTTP status from the upstream response, kept in context.
    pub fn with_status(self, status: u16) -> Self {
        self.with_context("status", status)
    }

    /// Upstream endpoint name, kept in context.
    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        self.with_context("endpoint", endpoint.into())
    }

    /// Attaches a tool name if none is set yet.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        if self.tool.is_none() {
            self.tool = Some(tool.into());
        }
        self
    }

    /// Overrides the code's default recoverability.
    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    /// The explicit recoverability flag; the only input (besides the code)
    /// the retry machinery is allowed to consult.
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn tool(&self) -> Option<&str> {
        self.tool.as_deref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Structured wire shape: `{code, message, tool, timestamp, context}`.
    ///
    /// Context is carried verbatim; callers are responsible for never having
    /// put secrets into it in the first place.
    pub fn to_wire(&self) -> Value {
        let ts = self
            .wall_time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        serde_json::json!({
            "code": self.code.as_str(),
            "message": self.message,
            "tool": self.tool,
            "timestamp": ts,
            "context": self.context,
        })
    }

    /// Maps an upstream HTTP status into the taxonomy.
    pub fn from_http_status(status: u16, endpoint: &str) -> Self {
        let code = match status {
            401 | 403 => ErrorCode::ApiAuthFailed,
            408 => ErrorCode::ApiTimeout,
            429 => ErrorCode::ApiRateLimit,
            500..=599 => ErrorCode::ApiServiceUnavailable,
            _ => ErrorCode::ApiRequestFailed,
        };
        Self::new(code, format!("upstream returned status {status}"))
            .with_status(status)
            .with_endpoint(endpoint)
    }
}

/// Translates an arbitrary error into an [`AnalyticalError`].
///
/// Total and idempotent: an `AnalyticalError` passes through with its code
/// and context intact; anything else is classified from its message with
/// `TOOL_EXECUTION_FAILED` as the fallback.
pub fn translate(err: Box<dyn std::error::Error + Send + Sync>) -> AnalyticalError {
    match err.downcast::<AnalyticalError>() {
        Ok(known) => *known,
        Err(other) => classify_message(&other.to_string()),
    }
}

fn classify_message(message: &str) -> AnalyticalError {
    let lower = message.to_ascii_lowercase();
    let code = if lower.contains("timeout") || lower.contains("timed out") {
        ErrorCode::ApiTimeout
    } else if lower.contains("rate limit") || lower.contains("too many requests") || lower.contains("429") {
        ErrorCode::ApiRateLimit
    } else if lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("auth")
        || lower.contains("401")
        || lower.contains("403")
    {
        ErrorCode::ApiAuthFailed
    } else if lower.contains("unavailable")
        || lower.contains("bad gateway")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
    {
        ErrorCode::ApiServiceUnavailable
    } else if lower.contains("connection") || lower.contains("network") || lower.contains("dns") {
        ErrorCode::ApiRequestFailed
    } else {
        ErrorCode::ToolExecutionFailed
    };
    AnalyticalError::new(code, message)
}
