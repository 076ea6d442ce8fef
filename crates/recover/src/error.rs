use thiserror::Error;

/// Recovery errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Resolve error: {0}")]
    Resolve(#[from] recover_x86::ResolveError),
}

pub type Result<T> = std::result::Result<T, Error>;
