use thiserror::Error;

use crate::db::models::OrderStatus;

/// Raised when a stored or user-supplied value does not name a known variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind}: {value}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Failures of marketplace operations.
///
/// Everything except `Database` and `Telegram` is safe to show to the user
/// verbatim; those two are logged and replaced by a generic reply.
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Please use /start to register first.")]
    NotRegistered,
    #[error("{0} not found.")]
    NotFound(&'static str),
    #[error("You are not allowed to do that.")]
    Forbidden,
    #[error("{0}")]
    Validation(String),
    #[error("Order cannot move from {from} to {to}.")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Your seller account is suspended. Contact an admin to re-activate it.")]
    Suspended,
    #[error("You have reached the free plan limit of {0} dishes. Use /upgrade to go Pro.")]
    UploadLimit(i32),
    #[error("Your cart is empty.")]
    EmptyCart,
    #[error("{0} is no longer available.")]
    Unavailable(String),
    #[error("Id {0} matches more than one record, please type more characters.")]
    Ambiguous(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

impl MarketError {
    pub fn is_internal(&self) -> bool {
        matches!(self, MarketError::Database(_) | MarketError::Telegram(_))
    }
}

impl From<ParseError> for MarketError {
    fn from(err: ParseError) -> Self {
        MarketError::Validation(err.to_string())
    }
}
