// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for the filter kernel.

/// A specialized `Result` type for filter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error from the filter kernel.
///
/// Both variants are programmer errors: they indicate misconfiguration or a
/// merge across filters that were never compatible, and are returned
/// synchronously by the offending call.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A filter was constructed with a zero bit count or hash count.
    #[error("filter parameters must be positive (got m = {m}, k = {k})")]
    InvalidShape {
        /// The requested bit count.
        m: usize,
        /// The requested hash count.
        k: usize,
    },

    /// Two filters with different parameters were merged.
    ///
    /// Filters are mergeable only when both `m` and `k` match; the fleet
    /// agrees on these out of band and never mixes them within a window.
    #[error("cannot merge filters of mismatched parameters (m = {m}, k = {k} vs m = {other_m}, k = {other_k})")]
    SizeMismatch {
        /// The target filter's bit count.
        m: usize,
        /// The target filter's hash count.
        k: usize,
        /// The source filter's bit count.
        other_m: usize,
        /// The source filter's hash count.
        other_k: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Error: Send, Sync);
    }

    #[test]
    fn display_names_both_shapes() {
        let error = Error::SizeMismatch {
            m: 11,
            k: 3,
            other_m: 13,
            other_k: 4,
        };

        let rendered = error.to_string();
        assert!(rendered.contains("m = 11"));
        assert!(rendered.contains("m = 13"));
    }
}
