use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlChatError {
    #[error("schema: unable to retrieve warehouse schema: {source}")]
    SchemaUnavailable { source: Box<SqlChatError> },

    #[error("rejected: {reason}")]
    SqlRejected { reason: String },

    #[error("connection: {message}")]
    ConnectionUnavailable { message: String },

    #[error("timeout: statement timed out after {seconds}s")]
    StatementTimeout { seconds: u64 },

    #[error("database: {message}")]
    Database { message: String },

    #[error("format: {message}")]
    FormattingFailed { message: String },

    #[error("model: {message}")]
    Model { message: String },

    #[error("config: {message}")]
    Config { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Machine-readable error category reported in a request envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaUnavailable,
    SqlRejected,
    ConnectionUnavailable,
    StatementTimeout,
    DatabaseError,
    FormattingFailed,
    ModelUnavailable,
    Internal,
}

impl SqlChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // A schema fetch that died on the pool is a connection problem for the caller.
            SqlChatError::SchemaUnavailable { source } => match source.kind() {
                ErrorKind::ConnectionUnavailable => ErrorKind::ConnectionUnavailable,
                _ => ErrorKind::SchemaUnavailable,
            },
            SqlChatError::SqlRejected { .. } => ErrorKind::SqlRejected,
            SqlChatError::ConnectionUnavailable { .. } => ErrorKind::ConnectionUnavailable,
            SqlChatError::StatementTimeout { .. } => ErrorKind::StatementTimeout,
            SqlChatError::Database { .. } => ErrorKind::DatabaseError,
            SqlChatError::FormattingFailed { .. } => ErrorKind::FormattingFailed,
            SqlChatError::Model { .. } => ErrorKind::ModelUnavailable,
            SqlChatError::Config { .. } | SqlChatError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Text safe to show an end user. Never includes backend error detail.
    pub fn user_message(&self) -> String {
        match self {
            SqlChatError::SqlRejected { reason } => format!(
                "I couldn't generate a safe query for that request. {}",
                reason
            ),
            other => other.kind().user_message().to_string(),
        }
    }
}

impl ErrorKind {
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::SchemaUnavailable => {
                "Unable to retrieve database schema. Please check your warehouse connection."
            }
            ErrorKind::SqlRejected => "I couldn't generate a safe query for that request.",
            ErrorKind::ConnectionUnavailable => {
                "Database connection error. Please check your connection settings."
            }
            ErrorKind::StatementTimeout => {
                "Query took too long to execute. Please try a more specific question."
            }
            ErrorKind::DatabaseError => {
                "The generated query could not be run. Please try rephrasing your question."
            }
            ErrorKind::FormattingFailed | ErrorKind::ModelUnavailable | ErrorKind::Internal => {
                "An error occurred while processing your request. Please try again."
            }
        }
    }
}
