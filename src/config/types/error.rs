//! Errors raised while loading `rebundle.toml`.

use std::fmt;
use std::path::PathBuf;

use owo_colors::OwoColorize;
use thiserror::Error;

use super::FieldPath;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Config file named on the command line is missing
    #[error("{0}")]
    Validation(String),

    // Not a source: anyhow would print every problem twice
    #[error("{0}")]
    Diagnostics(ConfigDiagnostics),
}

/// One problem with a config field.
#[derive(Debug, Clone)]
struct Problem {
    field: FieldPath,
    message: String,
    hint: Option<String>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {} {}", self.field, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n    {} {hint}", "hint:".yellow())?;
        }
        Ok(())
    }
}

/// Problems found by validation. Errors fail the load, warnings are
/// printed and the load goes on.
#[derive(Debug, Default)]
pub struct ConfigDiagnostics {
    errors: Vec<Problem>,
    warnings: Vec<Problem>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: FieldPath, message: impl Into<String>) {
        self.errors.push(Problem {
            field,
            message: message.into(),
            hint: None,
        });
    }

    pub fn error_with_hint(
        &mut self,
        field: FieldPath,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.errors.push(Problem {
            field,
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn warn(&mut self, field: FieldPath, message: impl Into<String>) {
        self.warnings.push(Problem {
            field,
            message: message.into(),
            hint: None,
        });
    }

    pub fn print_warnings(&self) {
        for warning in &self.warnings {
            crate::log!("warning"; "{}: {}", warning.field, warning.message);
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", "invalid rebundle.toml:".red().bold())?;
        for problem in &self.errors {
            write!(f, "\n{problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigDiagnostics {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_error_names_file() {
        let err = ConfigError::Io(
            PathBuf::from("rebundle.toml"),
            Error::new(ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "cannot read `rebundle.toml`");
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let mut diag = ConfigDiagnostics::new();
        diag.warn(FieldPath::new("build.plugins"), "ignored");
        assert_eq!(diag.error_count(), 0);
        assert!(diag.into_result().is_ok());
    }

    #[test]
    fn test_errors_listed_with_hints() {
        let mut diag = ConfigDiagnostics::new();
        diag.error(FieldPath::new("bundle.files"), "empty suffix would match every file");
        diag.error_with_hint(FieldPath::new("bundle.exclude"), "`/abs` must be relative", "use `abs`");

        let display = diag.into_result().unwrap_err().to_string();
        let lines: Vec<&str> = display.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("bundle.files") && lines[1].ends_with("empty suffix would match every file"));
        assert!(lines[2].contains("bundle.exclude"));
        assert!(lines[3].contains("hint:") && lines[3].ends_with("use `abs`"));
    }
}
