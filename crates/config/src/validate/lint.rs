//! Configuration linting
//!
//! Reports settings that are accepted but probably not what the operator
//! meant. Findings are warnings only and never stop start-up.

use crate::Config;

/// Lint a validated configuration
pub fn lint_config(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    for path in &config.input_paths {
        if !path.exists() {
            warnings.push(format!(
                "Input path {:?} does not exist (it will fail every sweep)",
                path
            ));
        } else if config.directories && !path.is_dir() {
            warnings.push(format!(
                "Input path {:?} is not a directory but directory mode is on",
                path
            ));
        } else if !config.directories && path.is_dir() {
            warnings.push(format!(
                "Input path {:?} is a directory; did you mean to pass --dirs?",
                path
            ));
        }
    }

    if config.allow_non_ocsp_in_dir && !config.directories {
        warnings.push(
            "allow-non-ocsp-in-dir only applies when scanning directories".to_string(),
        );
    }

    if config.timer_t1 > 0.9 {
        warnings.push(format!(
            "Timer T1 of {} leaves little time to retry before staples expire",
            config.timer_t1
        ));
    }

    for dir in &config.issuer_dirs {
        if !dir.is_dir() {
            warnings.push(format!("Issuer directory {:?} is not a directory", dir));
        }
    }

    warnings
}
