use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a document or page operation.
///
/// Every backend slot reports one of these variants and callers branch on the
/// variant, never on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
    #[error("an unknown error occurred")]
    Unknown,
    #[error("out of memory")]
    OutOfMemory,
    #[error("the operation is not implemented by this backend")]
    NotImplemented,
    #[error("invalid arguments")]
    InvalidArguments,
    #[error("the provided password is invalid")]
    InvalidPassword,
}

impl Error {
    /// `NotImplemented` means a feature is absent, not that the document is broken.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Error::NotImplemented)
    }
}
