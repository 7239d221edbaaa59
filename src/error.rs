//! Error types for the reducible-background analysis.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// A value outside the domain an operation is defined on (e.g. an
    /// identity code that is not a charged lepton).
    #[error("domain error: {0}")]
    Domain(String),

    /// Event input that cannot be interpreted (zero identity code,
    /// lepton branches of different lengths, nulls).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The selection produced a state its rules should have made
    /// impossible.
    #[error("selection invariant violated: {0}")]
    Invariant(String),

    #[error("fake-rate table error: {0}")]
    FakeRate(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error must abort the whole run rather than just the event
    /// it was raised for.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MalformedInput(_) | Error::Domain(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
