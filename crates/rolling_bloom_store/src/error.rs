// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for store operations.

/// A specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error from a bitmap store operation.
///
/// Store errors are transient by design: the synchronization routines that
/// call into a store log them and retry on the next scheduled cycle, so this
/// type favors a cause chain over fine-grained variants.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The store could not be reached or refused the operation.
    #[error("bitmap store unavailable: {0}")]
    Unavailable(String),

    /// We are re-packaging an error from the underlying client without
    /// adding further detail.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Creates an [`Error::Unavailable`] from any displayable reason.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Wraps an arbitrary client error.
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }
}
