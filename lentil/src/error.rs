use thiserror::Error;

/// Failures callers are expected to match on
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SafeError {
    #[error("shape mismatch: {context} expects {expected} rows, found {found}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(
        "score matrix of shape ({nrows}, {ncols}) matches neither node-major \
         nor feature-major orientation"
    )]
    UnresolvedOrientation { nrows: usize, ncols: usize },

    #[error("no SAFE computation on record; supply n_iter explicitly")]
    EmptyHistory,
}
