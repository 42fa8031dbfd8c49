//! Configuration for the OCSP staple renewer
//!
//! A [`Config`] can be built in code, loaded from a TOML file with
//! [`Config::from_file`], and is overridden field by field by the command
//! line. It must pass [`Config::validate`] before use; the validated value
//! is immutable for the rest of the process.
//!
//! # Example
//!
//! ```toml
//! directories = true
//! output-dir = "/var/lib/ocsp"
//! extension = ".ocsp"
//! timer-t1 = 50
//! cert-extensions = ".crt .pem"
//! exclude-suffixes = [".issuer.pem"]
//! issuer-dirs = ["/etc/ssl/issuers"]
//! input-paths = ["/etc/ssl/live"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

mod errors;
pub mod validate;

pub use errors::ConfigError;
pub use validate::lint::lint_config;

/// Default staple filename extension
pub const DEFAULT_EXTENSION: &str = ".ocsp";

/// Default certificate filename extensions (space-separated)
pub const DEFAULT_CERT_EXTENSIONS: &str = ".crt .cert .pem";

/// Default T1 ratio
pub const DEFAULT_TIMER_T1: f64 = 0.5;

/// Glob used when the certificate extension list is empty
pub const FALLBACK_CERT_GLOB: &str = "*.crt";

/// Renewer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Whether input paths denote directories to scan rather than files
    pub directories: bool,

    /// Where generated OCSP staples are written
    pub output_dir: PathBuf,

    /// Filename extension put on staples
    pub extension: String,

    /// How far through a staple's validity window to start renewing.
    /// A ratio, or a percentage in [1, 100] before validation.
    pub timer_t1: f64,

    /// Renew at start-up regardless of timers
    pub immediate: bool,

    /// Skip, rather than fail on, certificates without OCSP information
    /// found while scanning directories
    pub allow_non_ocsp_in_dir: bool,

    /// Space-separated extensions identifying certificate files in a scan
    pub cert_extensions: String,

    /// Filename suffixes excluded from directory scans; also the naming
    /// convention for issuer sidecar files
    pub exclude_suffixes: Vec<String>,

    /// Directories holding issuer certificates for lookup
    pub issuer_dirs: Vec<PathBuf>,

    /// HTTP User-Agent sent to OCSP responders
    pub http_user_agent: String,

    /// Files or directories to process
    pub input_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directories: false,
            output_dir: PathBuf::from("./"),
            extension: DEFAULT_EXTENSION.to_string(),
            timer_t1: DEFAULT_TIMER_T1,
            immediate: false,
            allow_non_ocsp_in_dir: false,
            cert_extensions: DEFAULT_CERT_EXTENSIONS.to_string(),
            exclude_suffixes: vec![".issuer.pem".to_string(), ".issuer.crt".to_string()],
            issuer_dirs: Vec::new(),
            http_user_agent: default_user_agent(),
            input_paths: Vec::new(),
        }
    }
}

fn default_user_agent() -> String {
    format!("ocsprenewer/{}", env!("CARGO_PKG_VERSION"))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Fields missing from the file keep their defaults. The result is not
    /// yet validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        trace!(path = %path.display(), "Reading configuration file");

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(
            path = %path.display(),
            input_paths = config.input_paths.len(),
            "Loaded configuration file"
        );
        Ok(config)
    }

    /// Validate and normalize, consuming the raw configuration
    pub fn validate(self) -> Result<Self, ConfigError> {
        validate::validate(self)
    }

    /// Certificate extensions, split on whitespace
    pub fn cert_extension_list(&self) -> impl Iterator<Item = &str> {
        self.cert_extensions.split_whitespace()
    }

    /// Glob patterns matching certificate files inside a directory
    pub fn cert_globs(&self) -> Vec<String> {
        let globs: Vec<String> = self
            .cert_extension_list()
            .map(|ext| format!("*{}", glob::Pattern::escape(ext)))
            .collect();
        if globs.is_empty() {
            vec![FALLBACK_CERT_GLOB.to_string()]
        } else {
            globs
        }
    }

    /// Whether a filename ends with one of the excluded suffixes
    pub fn is_excluded(&self, file_name: &str) -> bool {
        self.exclude_suffixes
            .iter()
            .any(|suffix| !suffix.is_empty() && file_name.ends_with(suffix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_defaults_match_cli_defaults() {
        let config = Config::default();
        assert_eq!(config.extension, ".ocsp");
        assert_eq!(config.timer_t1, 0.5);
        assert_eq!(config.output_dir, PathBuf::from("./"));
        assert!(config.http_user_agent.starts_with("ocsprenewer/"));
    }

    #[test]
    fn test_cert_globs() {
        let config = Config::default();
        assert_eq!(config.cert_globs(), vec!["*.crt", "*.cert", "*.pem"]);

        let config = Config {
            cert_extensions: "   ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.cert_globs(), vec!["*.crt"]);
    }

    #[test]
    fn test_cert_globs_escape_metacharacters() {
        let config = Config {
            cert_extensions: ".c[r]t .p?m".to_string(),
            ..Default::default()
        };
        let globs = config.cert_globs();
        assert_eq!(globs, vec!["*.c[[]r[]]t", "*.p[?]m"]);

        let bracket = glob::Pattern::new(&globs[0]).unwrap();
        assert!(bracket.matches("www.c[r]t"));
        assert!(!bracket.matches("www.crt"));

        let question = glob::Pattern::new(&globs[1]).unwrap();
        assert!(question.matches("www.p?m"));
        assert!(!question.matches("www.pem"));
    }

    #[test]
    fn test_is_excluded() {
        let config = Config::default();
        assert!(config.is_excluded("www.issuer.pem"));
        assert!(!config.is_excluded("www.pem"));

        let config = Config {
            exclude_suffixes: vec![String::new()],
            ..Default::default()
        };
        assert!(!config.is_excluded("www.pem"));
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "directories = true\noutput-dir = {:?}\ntimer-t1 = 75\ninput-paths = [\"/etc/ssl/live\"]",
            dir.path()
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.directories);
        assert_eq!(config.timer_t1, 75.0);
        assert_eq!(config.input_paths, vec![PathBuf::from("/etc/ssl/live")]);
        assert_eq!(config.extension, ".ocsp");

        let config = config.validate().unwrap();
        assert_eq!(config.timer_t1, 0.75);
    }

    #[test]
    fn test_from_file_rejects_unknown_fields() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "no-such-field = 1").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/nonexistent/ocsprenewer.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
