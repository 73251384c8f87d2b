//! rebundle - on-demand esbuild bundling for browser test runners.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ColorChoice, Parser};
use rebundle::backend::esbuild::EsbuildFactory;
use rebundle::cli::{Cli, Commands, build::build_tests};
use rebundle::config::RebundleConfig;
use rebundle::logger::TerminalLog;
use rebundle::serve::{Session, bind_server};
use rebundle::{core, log};
use tokio::runtime::Runtime;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = RebundleConfig::load(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    let _guard = runtime.enter();

    let factory = EsbuildFactory::locate(&config.root)?;
    let session = Session::new(
        config.bundle.clone(),
        config.build.clone(),
        factory,
        Arc::new(TerminalLog::default()),
    )
    .context("Failed to create test entry point")?;

    match &cli.command {
        Commands::Build { .. } => build(&runtime, &session, &config.bundle.output),
        Commands::Serve { .. } => serve(&runtime, &session, &config),
    }
}

// =============================================================================
// Build Command
// =============================================================================

fn build(runtime: &Runtime, session: &Arc<Session<EsbuildFactory>>, output: &Path) -> Result<()> {
    let summary = runtime.block_on(async {
        let summary = build_tests(session, output, false).await;
        session.stop().await;
        summary
    })?;

    if summary.failed > 0 {
        bail!(
            "{} of {} bundles failed",
            summary.failed,
            summary.failed + summary.written.len()
        );
    }
    log!("build"; "wrote {} bundles to {}", summary.written.len(), output.display());
    Ok(())
}

// =============================================================================
// Serve Command
// =============================================================================

fn serve(
    runtime: &Runtime,
    session: &Arc<Session<EsbuildFactory>>,
    config: &RebundleConfig,
) -> Result<()> {
    let server = bind_server(&config.serve, Arc::clone(session), runtime.handle().clone())?;
    let result = server.run();

    // Quiesce every bundle and remove the entry point, even after an error
    runtime.block_on(session.stop());
    result
}
