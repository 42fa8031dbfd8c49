//! Path validation
//!
//! Checks the output directory and the staple extension.

use std::fs;
use std::path::Path;

use crate::ConfigError;

/// Check that the output directory exists and is a directory
pub fn check_output_dir(dir: &Path) -> Result<(), ConfigError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(ConfigError::OutputDirMissing {
            path: dir.to_path_buf(),
        }),
    }
}

/// Give the staple extension a leading dot
pub fn normalize_extension(ext: &str) -> Result<String, ConfigError> {
    let ext = ext.trim();
    if ext.is_empty() || ext == "." {
        return Err(ConfigError::EmptyExtension);
    }
    if ext.starts_with('.') {
        Ok(ext.to_string())
    } else {
        Ok(format!(".{}", ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_output_dir_exists() {
        let dir = TempDir::new().unwrap();
        assert!(check_output_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_output_dir_is_file() {
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(
            check_output_dir(file.path()),
            Err(ConfigError::OutputDirMissing { .. })
        ));
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".ocsp").unwrap(), ".ocsp");
        assert_eq!(normalize_extension("ocsp").unwrap(), ".ocsp");
        assert!(normalize_extension("").is_err());
        assert!(normalize_extension(".").is_err());
    }
}
