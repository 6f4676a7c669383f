//! Engine error taxonomy.
//!
//! Business-rule violations are detected before any durable mutation and
//! surfaced synchronously; transient store failures roll the transaction
//! back and are the only retryable class.

use crate::model::CouponStatus;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by ledger, issuance, lifecycle, redemption, and access
/// gate operations.
///
/// Each variant carries enough context (current status, balance, minimum)
/// for the caller to decide whether to correct input, retry, or give up.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("requested amount {got} is below the minimum of {minimum}")]
    BelowMinimum { minimum: i64, got: i64 },

    #[error("tenant already has a pending credit request")]
    DuplicatePendingRequest,

    #[error("insufficient credit: balance {balance}, required {required}")]
    InsufficientCredit { balance: i64, required: i64 },

    #[error("insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error("invalid coupon state: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("batch has already been printed")]
    AlreadyPrinted,

    #[error("batch must be printed before activation")]
    MustPrintFirst,

    #[error("coupon not found")]
    CouponNotFound,

    #[error("coupon has expired")]
    CouponExpired,

    #[error("coupon is not active: current status {status}")]
    CouponNotActive { status: CouponStatus },

    #[error("coupon has already been used")]
    AlreadyUsed,

    #[error("coupon usage limit of {limit} reached")]
    UsageLimitExceeded { limit: i64 },

    #[error("coupon belongs to a different verification app")]
    AppMismatch,

    #[error("referenced entity belongs to a different verification app")]
    CrossAppAccess,

    #[error("unknown API key")]
    Unauthorized,

    #[error("operation not permitted")]
    Forbidden,

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl EngineError {
    /// Stable machine-readable kind identifier for API surfaces.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::InvalidAmount => "invalid_amount",
            Self::BelowMinimum { .. } => "below_minimum",
            Self::DuplicatePendingRequest => "duplicate_pending_request",
            Self::InsufficientCredit { .. } => "insufficient_credit",
            Self::InsufficientPoints { .. } => "insufficient_points",
            Self::InvalidState { .. } => "invalid_state",
            Self::AlreadyPrinted => "already_printed",
            Self::MustPrintFirst => "must_print_first",
            Self::CouponNotFound => "coupon_not_found",
            Self::CouponExpired => "coupon_expired",
            Self::CouponNotActive { .. } => "coupon_not_active",
            Self::AlreadyUsed => "already_used",
            Self::UsageLimitExceeded { .. } => "usage_limit_exceeded",
            Self::AppMismatch => "app_mismatch",
            Self::CrossAppAccess => "cross_app_access",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::InvalidUuid(_) | Self::InvalidTimestamp(_) => "corrupt_record",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Whether the caller may retry the operation as-is.
    ///
    /// Only transient store failures (lock timeout, connection loss) are
    /// retryable; business-rule errors require caller correction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Shorthand for a validation failure with a formatted message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a missing-entity failure.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}
