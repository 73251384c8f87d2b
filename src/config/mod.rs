//! Project configuration from `rebundle.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── bundle     # [bundle]
//! │   └── serve      # [serve]
//! ├── types/         # Utility types
//! │   ├── error      # ConfigError, ConfigDiagnostics
//! │   └── field      # FieldPath
//! └── mod.rs         # RebundleConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section    | Purpose                                             |
//! |------------|-----------------------------------------------------|
//! | `[bundle]` | Test discovery, exclusion, single vs per-file mode  |
//! | `[build]`  | Compiler options, unknown keys passed through       |
//! | `[serve]`  | Test server (interface, port, watch)                |
//!
//! The file is optional: without one, defaults apply relative to the
//! working directory.

pub mod section;
pub mod types;
mod util;

use util::find_config_file;

pub use section::{BundleConfig, ServeConfig};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};

use crate::backend::BuildOptions;
use crate::cli::{BundleArgs, Cli, Commands};
use crate::{debug, log};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default config file name.
pub const CONFIG_FILE: &str = "rebundle.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing rebundle.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RebundleConfig {
    /// Absolute path to the config file, if one was found (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Project root: parent of the config file, else the working directory
    #[serde(skip)]
    pub root: PathBuf,

    /// Test discovery and bundling
    pub bundle: BundleConfig,

    /// Compiler options
    pub build: BuildOptions,

    /// Test server settings
    pub serve: ServeConfig,
}

impl RebundleConfig {
    /// Load configuration for `cli`.
    ///
    /// Searches upward from cwd for the config file, applies command line
    /// overrides, normalizes paths, then validates.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cwd, &cli.config) {
            Some(path) => {
                let path = crate::utils::path::absolutize(&path, &cwd);
                let mut config = Self::from_path(&path)?;
                config.config_path = Some(path);
                config
            }
            None if cli.config != Path::new(CONFIG_FILE) => {
                return Err(ConfigError::Validation(format!(
                    "config file `{}` not found",
                    cli.config.display()
                ))
                .into());
            }
            None => {
                debug!("config"; "no {CONFIG_FILE} found, using defaults");
                Self::default()
            }
        };

        // Validate raw paths before normalization
        let mut diag = ConfigDiagnostics::new();
        config.bundle.validate_paths(&mut diag);
        diag.into_result().map_err(ConfigError::Diagnostics)?;

        let root = config
            .config_path
            .as_deref()
            .and_then(Path::parent)
            .map_or(cwd, Path::to_path_buf);
        config.finalize(cli, &root);
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    ///
    /// `[build]` keeps unknown keys for the compiler, so only the other
    /// sections can report any.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Set root, apply command line options, normalize paths.
    fn finalize(&mut self, cli: &Cli, root: &Path) {
        self.root = crate::utils::path::normalize(root);
        self.apply_command_options(cli);
        let root = self.root.clone();
        self.bundle.normalize(&root);
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    /// Apply command-specific configuration options.
    fn apply_command_options(&mut self, cli: &Cli) {
        match &cli.command {
            Commands::Build {
                bundle_args,
                output,
            } => {
                self.apply_bundle_args(bundle_args);
                Self::update_option(&mut self.bundle.output, output.as_ref());
            }
            Commands::Serve {
                bundle_args,
                interface,
                port,
                watch,
            } => {
                self.apply_bundle_args(bundle_args);
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.watch, watch.as_ref());
            }
        }
    }

    /// Apply shared bundle arguments from CLI.
    fn apply_bundle_args(&mut self, args: &BundleArgs) {
        // Set verbose mode globally
        crate::logger::set_verbose(args.verbose);

        Self::update_option(&mut self.bundle.base_path, args.base_path.as_ref());
        Self::update_option(&mut self.bundle.single_bundle, args.single_bundle.as_ref());
        Self::update_option(&mut self.bundle.bundle_delay, args.bundle_delay.as_ref());
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate normalized configuration.
    ///
    /// Collects all validation errors and returns them at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();

        self.bundle.validate(&mut diag);

        if self.build.target.trim().is_empty() {
            diag.error(FieldPath::new("build.target"), "target must not be empty");
        }
        if !self.build.plugins.is_empty() {
            diag.warn(
                FieldPath::new("build.plugins"),
                "plugins are not supported by the esbuild executable and will be ignored",
            );
        }

        diag.print_warnings();
        diag.into_result().map_err(ConfigError::Diagnostics)
    }

    /// Join a path with the root directory.
    pub fn root_join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> RebundleConfig {
    let (parsed, ignored) = RebundleConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================
