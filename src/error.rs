use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while loading configuration or comparing a
/// pair of values. A [`Error::Mismatch`] is not a malfunction: it is the
/// ordinary result of a comparison whose sides differ, carrying the rendered
/// report for the caller's failure channel.
#[derive(Debug, Error)]
pub enum Error {
    /// The harness or a suite file is set up wrongly. Fatal at setup.
    #[error("improperly configured: {0}")]
    Config(String),

    /// A test suite file could not be parsed.
    #[error("invalid test config {path}: {source}")]
    Suite {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The style file could not be parsed.
    #[error("invalid style config: {0}")]
    Styles(#[from] toml::de::Error),

    /// Bytes were not valid under the declared encoding. Fatal for the one
    /// comparison it occurs in; never rendered as a diff.
    #[error("could not decode bytes as {encoding}: {source}")]
    Decode {
        encoding: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// The child process outlived its per-case deadline and was killed.
    #[error("command timed out after {0}s")]
    Timeout(u64),

    /// Expected and actual differ; the payload is the rendered report.
    #[error("{0}")]
    Mismatch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
