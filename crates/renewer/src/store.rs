//! Staple storage
//!
//! Staples are raw DER OCSP responses stored as
//! `<output-dir>/<cert basename without known extension><staple extension>`.
//!
//! Writes go through a temporary file in the target's directory which is
//! renamed onto the target once complete, so readers only ever see the old
//! staple or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, trace};

use ocsprenewer_config::Config;

/// Staple storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cannot derive a staple filename from {path}")]
    EmptyFilename { path: PathBuf },

    #[error("failed to read staple {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create temporary file in {dir}: {source}")]
    TempFile {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write staple {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("short write for staple {path}: {written} of {expected} bytes")]
    ShortWrite {
        path: PathBuf,
        written: u64,
        expected: u64,
    },

    #[error("failed to move staple into place at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Location and naming of staple files
#[derive(Debug, Clone)]
pub struct StapleStore {
    output_dir: PathBuf,
    extension: String,
    cert_extensions: Vec<String>,
}

impl StapleStore {
    pub fn new(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            extension: config.extension.clone(),
            cert_extensions: config.cert_extension_list().map(str::to_string).collect(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Staple path for a certificate file
    ///
    /// Each known certificate extension is stripped in turn from the
    /// basename before the staple extension is appended.
    pub fn staple_path(&self, cert_path: &Path) -> Result<PathBuf, StorageError> {
        let empty = || StorageError::EmptyFilename {
            path: cert_path.to_path_buf(),
        };

        let file_name = cert_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(empty)?;

        let mut stem = file_name;
        for ext in &self.cert_extensions {
            if let Some(stripped) = stem.strip_suffix(ext.as_str()) {
                stem = stripped;
            }
        }
        if stem.is_empty() {
            return Err(empty());
        }

        Ok(self.output_dir.join(format!("{}{}", stem, self.extension)))
    }

    /// Read an existing staple; a missing file is not an error
    pub fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(path) {
            Ok(raw) => {
                trace!(path = %path.display(), size = raw.len(), "Read existing staple");
                Ok(Some(raw))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(path = %path.display(), "No existing staple");
                Ok(None)
            }
            Err(source) => Err(StorageError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Atomically replace the staple at `path`
    ///
    /// Returns `Ok(false)` without touching the disk when writes are not
    /// permitted. Any failure removes the temporary file and leaves an
    /// existing staple untouched.
    pub fn write(&self, path: &Path, data: &[u8], permit_writes: bool) -> Result<bool, StorageError> {
        if !permit_writes {
            info!(
                path = %path.display(),
                size = data.len(),
                "Not really writing staple"
            );
            return Ok(false);
        }

        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| StorageError::TempFile {
            dir: dir.to_path_buf(),
            source,
        })?;
        trace!(tmp = %tmp.path().display(), "Created temporary staple file");

        let write_err = |source| StorageError::Write {
            path: path.to_path_buf(),
            source,
        };

        tmp.write_all(data).map_err(write_err)?;
        tmp.flush().map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;

        let written = tmp.as_file().metadata().map_err(write_err)?.len();
        let expected = data.len() as u64;
        if written != expected {
            return Err(StorageError::ShortWrite {
                path: path.to_path_buf(),
                written,
                expected,
            });
        }

        if let Ok(existing) = fs::metadata(path) {
            fs::set_permissions(tmp.path(), existing.permissions()).map_err(write_err)?;
            debug!(path = %path.display(), "Copied permissions from previous staple");
        }

        tmp.persist(path).map_err(|e| StorageError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;

        info!(path = %path.display(), size = data.len(), "Wrote staple");
        Ok(true)
    }
}
