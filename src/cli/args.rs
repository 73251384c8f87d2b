//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// On-demand esbuild bundling for browser test runners
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: rebundle.toml, searched upward)
    #[arg(short = 'C', long, global = true, default_value = crate::config::CONFIG_FILE, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Bundle every test entry once, writing code and source maps
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        bundle_args: BundleArgs,

        /// Output directory (relative to project root)
        #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
        output: Option<PathBuf>,
    },

    /// Serve bundles on demand, rebundling when files change
    #[command(visible_alias = "s")]
    Serve {
        #[command(flatten)]
        bundle_args: BundleArgs,

        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<std::net::IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable file watching for auto-rebundle
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },
}

/// Shared arguments for Build and Serve commands
#[derive(clap::Args, Debug, Clone)]
pub struct BundleArgs {
    /// Directory scanned for test files (relative to project root)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub base_path: Option<PathBuf>,

    /// Bundle all tests into one file instead of one bundle per test
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub single_bundle: Option<bool>,

    /// Debounce window in milliseconds before a single-bundle build (negative: none)
    #[arg(short = 'd', long, allow_negative_numbers = true)]
    pub bundle_delay: Option<i64>,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long)]
    pub verbose: bool,
}

#[allow(unused)]
impl Cli {
    pub const fn is_build(&self) -> bool {
        matches!(self.command, Commands::Build { .. })
    }
    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from(["rebundle", "serve", "-p", "8080", "-w", "false", "-V"]);
        let Commands::Serve {
            bundle_args,
            port,
            watch,
            interface,
        } = cli.command
        else {
            panic!("expected serve");
        };
        assert_eq!(port, Some(8080));
        assert_eq!(watch, Some(false));
        assert!(interface.is_none());
        assert!(bundle_args.verbose);
    }

    #[test]
    fn test_parse_build_alias() {
        let cli = Cli::parse_from(["rebundle", "b", "--single-bundle", "-o", "out"]);
        assert!(cli.is_build());
        let Commands::Build {
            bundle_args,
            output,
        } = cli.command
        else {
            panic!("expected build");
        };
        assert_eq!(bundle_args.single_bundle, Some(true));
        assert_eq!(output, Some(PathBuf::from("out")));
        assert_eq!(cli.config, PathBuf::from("rebundle.toml"));
    }

    #[test]
    fn test_negative_bundle_delay() {
        let cli = Cli::parse_from(["rebundle", "serve", "--bundle-delay", "-1"]);
        let Commands::Serve { bundle_args, .. } = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(bundle_args.bundle_delay, Some(-1));
    }
}
