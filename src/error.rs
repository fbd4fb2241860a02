use thiserror::Error;

use crate::services::stripe::GatewayError;

/// Errors surfaced by the rental engine.
///
/// Every variant propagates unchanged to the caller; the only local
/// recoveries in the engine are the inventory release compensation on a
/// failed rental write and swallowed notification failures.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("no inventory available for car {0}")]
    NoInventoryAvailable(i64),

    #[error("rental {0} has already been returned")]
    AlreadyReturned(i64),

    #[error("payment for rental {0} has already been settled")]
    AlreadySettled(i64),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("payment gateway error: {0}")]
    PaymentGateway(#[from] GatewayError),

    #[error("payment is not completed")]
    PaymentNotCompleted,

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Storage(anyhow::Error::new(err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
