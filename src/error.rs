use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("{0} amount must be positive")]
    InvalidAmount(&'static str),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("academic year {0} is closed")]
    YearClosed(String),

    #[error("promotion already completed for academic year {0}")]
    AlreadyLocked(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    BadInput(String),

    #[error("confirmation token is unknown, expired or for a different action")]
    InvalidToken,
}

impl Error {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Stable wire code reported in IPC error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::AlreadyExists(_) => "already_exists",
            Error::YearClosed(_) => "year_closed",
            Error::AlreadyLocked(_) => "already_locked",
            Error::InvalidState(_) => "invalid_state",
            Error::BadInput(_) => "bad_params",
            Error::InvalidToken => "invalid_token",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
