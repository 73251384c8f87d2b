//! Logging utilities with colored output and status display.
//!
//! This module provides:
//! - `log!` / `debug!` macros for terminal output with colored prefixes
//! - [`Log`], the sink bundle coordinators report build failures to
//! - `WatchStatus` for watch mode status messages
//! - `ProgressLine` for the one-shot `build` command
//!
//! # Example
//!
//! ```ignore
//! log!("bundle"; "Compiling to {}...", file.display());
//!
//! let progress = ProgressLine::new("bundle", entries.len());
//! progress.inc();
//! progress.finish();
//! ```

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{Write, stdout},
    sync::LazyLock,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Global verbose flag (set by --verbose CLI argument)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Active progress line count (for log coordination)
static BAR_COUNT: AtomicUsize = AtomicUsize::new(0);

// ============================================================================
// Log Macro
// ============================================================================

/// Log a message with a colored module prefix
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when --verbose is enabled)
///
/// # Usage
/// ```ignore
/// debug!("module"; "debug info: {}", value);
/// ```
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix
#[inline]
#[allow(clippy::cast_possible_truncation)] // Safe: bars count is always small
pub fn log(module: &str, message: &str) {
    let module_lower = module.to_ascii_lowercase();
    let prefix = colorize_prefix(module, &module_lower);

    let mut stdout = stdout().lock();

    let bar_count = BAR_COUNT.load(Ordering::SeqCst);
    if bar_count > 0 {
        execute!(stdout, cursor::MoveUp(bar_count as u16)).ok();
        execute!(stdout, Clear(ClearType::FromCursorDown)).ok();
    } else {
        execute!(stdout, Clear(ClearType::UntilNewLine)).ok();
    }

    writeln!(stdout, "{prefix} {message}").ok();

    if bar_count > 0 {
        for _ in 0..bar_count {
            writeln!(stdout).ok();
        }
    }

    stdout.flush().ok();
}

/// Apply color to a module prefix based on module type
#[inline]
fn colorize_prefix(module: &str, module_lower: &str) -> String {
    let prefix = format!("[{module}]");
    match module_lower {
        "serve" => prefix.bright_blue().bold().to_string(),
        "watch" => prefix.bright_green().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        "bundle" => prefix.bright_cyan().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

/// Render a duration in milliseconds as `1h 2min 3s`, or `250ms` below a second.
pub fn format_time(ms: u64) -> String {
    let seconds = (ms / 1000) % 60;
    let minutes = (ms / 60_000) % 60;
    let hours = ms / 3_600_000;

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}min"));
    }
    if seconds > 0 {
        parts.push(format!("{seconds}s"));
    }

    if parts.is_empty() {
        format!("{ms}ms")
    } else {
        parts.join(" ")
    }
}

// ============================================================================
// Log sink
// ============================================================================

/// Where bundle coordinators report build messages.
pub trait Log: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// [`Log`] writing through [`log`] with a fixed module prefix.
#[derive(Debug, Clone, Copy)]
pub struct TerminalLog {
    module: &'static str,
}

impl TerminalLog {
    pub const fn new(module: &'static str) -> Self {
        Self { module }
    }
}

impl Default for TerminalLog {
    fn default() -> Self {
        Self::new("bundle")
    }
}

impl Log for TerminalLog {
    fn info(&self, message: &str) {
        log(self.module, message);
    }

    fn error(&self, message: &str) {
        log("error", &format!("{}: {message}", self.module));
    }
}

/// [`Log`] that records messages, for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryLog {
    pub infos: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
}

#[cfg(test)]
impl Log for MemoryLog {
    fn info(&self, message: &str) {
        self.infos.lock().push(message.to_owned());
    }

    fn error(&self, message: &str) {
        self.errors.lock().push(message.to_owned());
    }
}

// ============================================================================
// Watch Status (single-line status with overwrite)
// ============================================================================

/// Get current UTC time formatted as HH:MM:SS
fn now() -> String {
    use std::time::SystemTime;
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Single-line status display for watch mode
///
/// Displays status messages that overwrite the previous output,
/// keeping the terminal clean.
///
/// # Example
///
/// ```ignore
/// let mut status = WatchStatus::new();
/// status.success("rebundled 3 test files");
/// status.error("build failed", "src/foo.test.ts:3:7: Expected \";\"");
/// ```
pub struct WatchStatus {
    /// Lines of previous output to clear
    last_lines: usize,
}

/// Global watch status display shared by the watcher and the session.
static WATCH_STATUS: LazyLock<Mutex<WatchStatus>> =
    LazyLock::new(|| Mutex::new(WatchStatus::new()));

impl WatchStatus {
    pub const fn new() -> Self {
        Self { last_lines: 0 }
    }

    /// Display success message (✓ prefix, green).
    pub fn success(&mut self, message: &str) {
        self.display(format!("{}", "✓".green()), message);
    }

    /// Display error message (✗ prefix, red) with optional detail.
    pub fn error(&mut self, summary: &str, detail: &str) {
        let message = if detail.is_empty() {
            summary.to_string()
        } else {
            format!("{summary}\n{detail}")
        };
        self.display(format!("{}", "✗".red()), &message);
    }

    /// Overwrites the previously displayed block.
    fn display(&mut self, symbol: String, message: &str) {
        let mut stdout = stdout().lock();

        if self.last_lines > 0 {
            #[allow(clippy::cast_possible_truncation)]
            let lines = self.last_lines as u16;
            execute!(stdout, cursor::MoveUp(lines)).ok();
            execute!(stdout, Clear(ClearType::FromCursorDown)).ok();
        }

        let timestamp = format!("[{}]", now()).dimmed().to_string();
        writeln!(stdout, "{timestamp} {symbol} {message}").ok();
        stdout.flush().ok();

        self.last_lines = line_count(message);
    }
}

impl Default for WatchStatus {
    fn default() -> Self {
        Self::new()
    }
}

fn line_count(message: &str) -> usize {
    message.matches('\n').count() + 1
}

/// Global watch status: success
pub fn status_success(message: &str) {
    WATCH_STATUS.lock().success(message);
}

/// Global watch status: error
pub fn status_error(summary: &str, detail: &str) {
    WATCH_STATUS.lock().error(summary, detail);
}

// ============================================================================
// Progress Line
// ============================================================================

/// Single-line counter, e.g. `[bundle] 3/12`
///
/// Uses `try_lock` so worker tasks never block on the terminal.
pub struct ProgressLine {
    module: &'static str,
    total: usize,
    current: AtomicUsize,
    lock: Mutex<()>,
}

impl ProgressLine {
    pub fn new(module: &'static str, total: usize) -> Self {
        BAR_COUNT.store(1, Ordering::SeqCst);

        let progress = Self {
            module,
            total,
            current: AtomicUsize::new(0),
            lock: Mutex::new(()),
        };
        progress.display(false);
        progress
    }

    #[inline]
    pub fn inc(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
        if let Some(_guard) = self.lock.try_lock() {
            self.display(false);
        }
    }

    fn display(&self, newline: bool) {
        let current = self.current.load(Ordering::Relaxed);
        let prefix = colorize_prefix(self.module, self.module);

        let mut stdout = stdout().lock();
        execute!(
            stdout,
            cursor::MoveToColumn(0),
            Clear(ClearType::CurrentLine)
        )
        .ok();
        if newline {
            writeln!(stdout, "{prefix} {current}/{}", self.total).ok();
        } else {
            write!(stdout, "{prefix} {current}/{}", self.total).ok();
        }
        stdout.flush().ok();
    }

    /// Keep the final line and move to the next one.
    pub fn finish(self) {
        BAR_COUNT.store(0, Ordering::SeqCst);
        {
            let _guard = self.lock.lock();
            self.display(true);
        }
        std::mem::forget(self); // Prevent Drop from clearing
    }
}

impl Drop for ProgressLine {
    fn drop(&mut self) {
        BAR_COUNT.store(0, Ordering::SeqCst);

        let mut stdout = stdout().lock();
        execute!(
            stdout,
            cursor::MoveToColumn(0),
            Clear(ClearType::CurrentLine)
        )
        .ok();
        stdout.flush().ok();
    }
}

// ============================================================================
// Tests
// ============================================================================
