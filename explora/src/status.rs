// src/status.rs
//
// Error code + formatted message carried from any call site back to the
// caller, plus the reporter that fans background failures out to the
// user callback and the watchdog.

use std::fmt;
use std::sync::Arc;

use crate::watchdog::Watchdog;

/// Stable error categories for the public surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidArgument,
    InvalidPdf,
    JsonParseError,
    NotSupported,
    BaselineActionsNotDefined,
    ModelUpdateError,
    ModelRankingError,
    ContentEncodingError,
    HttpUriNotProvided,
    SenderInitError,
    SendFailed,
    QueueFull,
    BackgroundThreadStart,
    UnhandledBackgroundError,
}

impl ErrorCode {
    /// Stable snake_case label used in traces and telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::InvalidPdf => "invalid_pdf",
            ErrorCode::JsonParseError => "json_parse_error",
            ErrorCode::NotSupported => "not_supported",
            ErrorCode::BaselineActionsNotDefined => "baseline_actions_not_defined",
            ErrorCode::ModelUpdateError => "model_update_error",
            ErrorCode::ModelRankingError => "model_ranking_error",
            ErrorCode::ContentEncodingError => "content_encoding_error",
            ErrorCode::HttpUriNotProvided => "http_uri_not_provided",
            ErrorCode::SenderInitError => "sender_init_error",
            ErrorCode::SendFailed => "send_failed",
            ErrorCode::QueueFull => "queue_full",
            ErrorCode::BackgroundThreadStart => "background_thread_start",
            ErrorCode::UnhandledBackgroundError => "unhandled_background_error",
        }
    }
}

/// An error code plus a human-formatted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn invalid_pdf(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPdf, message)
    }

    pub fn json_parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::JsonParseError, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotSupported, message)
    }

    pub fn baseline_actions_not_defined() -> Self {
        Self::new(
            ErrorCode::BaselineActionsNotDefined,
            "apprentice mode requires baseline actions for multi-slot decisions",
        )
    }

    pub fn model_update(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ModelUpdateError, message)
    }

    pub fn model_ranking(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ModelRankingError, message)
    }

    pub fn content_encoding(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ContentEncodingError, message)
    }

    pub fn http_uri_not_provided(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::HttpUriNotProvided, message)
    }

    pub fn sender_init(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SenderInitError, message)
    }

    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SendFailed, message)
    }

    pub fn queue_full(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QueueFull, message)
    }

    pub fn background_thread_start(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BackgroundThreadStart, message)
    }

    pub fn unhandled_background_error() -> Self {
        Self::new(
            ErrorCode::UnhandledBackgroundError,
            "a background task reported an unhandled error",
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

/// Callback invoked off the foreground thread for background failures.
pub type ErrorCallback = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Fans background errors out to the watchdog and the user callback.
///
/// The watchdog flag is always set so the next foreground decision can
/// surface the failure; the callback is invoked in addition when one was
/// supplied.
#[derive(Clone)]
pub struct ErrorReporter {
    watchdog: Arc<Watchdog>,
    callback: Option<ErrorCallback>,
}

impl ErrorReporter {
    pub fn new(watchdog: Arc<Watchdog>, callback: Option<ErrorCallback>) -> Self {
        Self { watchdog, callback }
    }

    pub fn report(&self, error: &ApiError) {
        self.watchdog.report_background_error();
        if let Some(cb) = &self.callback {
            cb(error);
        }
    }

    pub fn watchdog(&self) -> &Arc<Watchdog> {
        &self.watchdog
    }
}
