use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors; all of them are fatal at start-up
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no input paths to examine")]
    NoInputPaths,

    #[error("an HTTP User-Agent is required to talk to OCSP responders")]
    MissingUserAgent,

    #[error("timer T1 is not a number: {value}")]
    T1NotFinite { value: f64 },

    #[error("timer T1 set too small ({value}; 10% minimum)")]
    T1TooSmall { value: f64 },

    #[error("timer T1 set too large ({value}; 95% maximum)")]
    T1TooLarge { value: f64 },

    #[error("output directory {path:?} does not exist or is not a directory")]
    OutputDirMissing { path: PathBuf },

    #[error("staple extension must not be empty")]
    EmptyExtension,

    #[error("failed to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
