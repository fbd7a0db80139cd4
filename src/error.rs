use rusqlite::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    /// Two allocations raced for the same ledger entry; the caller may retry the whole request.
    #[error("invoice number {number} is already allocated")]
    AllocationConflict { number: String },

    #[error("malformed invoice model: {0}")]
    MalformedModel(String),

    #[error("rendering fault: {0}")]
    RenderingFault(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invoice {0} is already archived")]
    AlreadyArchived(String),

    #[error("archived record {0} failed its integrity check")]
    CorruptRecord(String),

    #[error("storage error: {}", sqlite_error_string(.0))]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("font error: {0}")]
    Font(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("exchange rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl InvoiceError {
    /// Errors the caller can fix by changing the request.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::MalformedModel(_) | Self::NotFound(_))
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedModel(msg.into())
    }

    pub fn fault(msg: impl Into<String>) -> Self {
        Self::RenderingFault(msg.into())
    }
}

impl From<config::ConfigError> for InvoiceError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for InvoiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

pub fn sqlite_error_string(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(code, msg) => {
            let message = msg.clone().unwrap_or_default();
            format!(
                "sqlite(code={:?}, extended_code={}, msg={})",
                code.code, code.extended_code, message
            )
        }
        other => other.to_string(),
    }
}

pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _) if code.code == ErrorCode::ConstraintViolation
    )
}

pub type Result<T> = std::result::Result<T, InvoiceError>;
