//! Error taxonomy shared by every layer of the load balancer.
//!
//! Mirrors the request-handling taxonomy: auth failures, policy
//! rejections, capacity/limit conditions, missing resources, upstream node
//! failures, and store I/O errors. Handlers translate these into a canned
//! protocol body or HTTP status; background tasks only ever log them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum B3lbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("policy violation: {0}")]
    PolicyFailure(String),

    #[error("limit reached: {0}")]
    LimitFailure(String),

    #[error("no capacity available: {0}")]
    NoCapacity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream node error: {0}")]
    Upstream(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, B3lbError>;
