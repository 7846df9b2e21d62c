/// All recoverable errors raised by fixgrad.
///
/// Shape and rank mismatches never show up here: they are part of the tensor
/// type and are rejected when the program is compiled. What remains are the
/// cases where data arrives at runtime (building a tensor from a slice or an
/// iterator, reading persisted bytes back).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Element count mismatch when creating a tensor from runtime data.
    ///
    /// Iterators are not drained past the first surplus element, so
    /// `got == expected + 1` means "more than `expected`".
    #[error(
        "element count mismatch: shape {shape:?} requires {expected} elements, got {}",
        received(.expected, .got)
    )]
    ElementCountMismatch {
        shape: &'static [usize],
        expected: usize,
        got: usize,
    },

    /// Reading or writing persisted fields failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

fn received(expected: &usize, got: &usize) -> String {
    if *got > *expected {
        format!("more than {}", expected)
    } else {
        got.to_string()
    }
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout fixgrad.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted error message.
/// Usage: `bail!("unexpected tag: {}", tag)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
