use thiserror::Error;

/// Errors surfaced by the address query layer.
///
/// An invalid address is not an error: it resolves to zeroed stats or an
/// empty list.
#[derive(Debug, Error)]
pub enum Error {
    /// The Electrum channel or the transaction source failed.
    #[error("{operation} failed: {message}")]
    Upstream {
        operation: &'static str,
        message: String,
    },

    /// Script hex handed to the scripthash codec was malformed.
    #[error("invalid script hex: {0}")]
    Encoding(#[from] hex::FromHexError),

    /// The address validator itself could not answer.
    #[error("address validation failed: {0}")]
    Validation(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Wraps a collaborator failure, flattening its cause chain into one message.
    pub fn upstream(operation: &'static str, err: anyhow::Error) -> Self {
        Error::Upstream {
            operation,
            message: format!("{:#}", err),
        }
    }
}
