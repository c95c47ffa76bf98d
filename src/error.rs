//! Domain error taxonomy shared by the account, session and hoax services.

use crate::{locale::Message, validation::FieldErrors};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Input did not pass the field-shape rules.
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),

    /// Bad credentials or a missing identity where one is required.
    #[error("unauthorized: {}", .0.key())]
    Unauthorized(Message),

    /// Missing, invalid or foreign-owned token, or a bad reset token.
    #[error("forbidden: {}", .0.key())]
    Forbidden(Message),

    #[error("not found: {}", .0.key())]
    NotFound(Message),

    /// Unknown or already consumed activation token.
    #[error("invalid token: {}", .0.key())]
    InvalidToken(Message),

    /// The mail gateway failed or timed out.
    #[error("mail delivery failed")]
    EmailFailure(#[source] anyhow::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl Error {
    #[must_use]
    pub fn validation(field: &'static str, message: Message) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field, message);
        Self::Validation(errors)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
