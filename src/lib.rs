//! rebundle - on-demand, debounced esbuild bundling for browser test runners.
//!
//! # Layers
//!
//! ```text
//! sync (Deferred, Debounce) ─┐
//! cache (KeyedCache) ────────┼─▶ bundle (Bundle) ─▶ registry (BundlerMap) ─▶ format_error
//! backend (esbuild) ─────────┘                              │
//!                                                           ▼
//!                         entry ─▶ serve (Session, HTTP, watcher) ─▶ cli
//! ```
//!
//! The coordination core (`sync`, `cache`, `bundle`, `registry`,
//! `format_error`) knows nothing about HTTP or the filesystem watcher.

pub mod backend;
pub mod bundle;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod entry;
pub mod error;
pub mod format_error;
pub mod logger;
pub mod registry;
pub mod serve;
pub mod sourcemap;
pub mod sync;
pub mod utils;

pub use bundle::{Artifact, Bundle, BundleEvent, BundleState, EventKind};
pub use error::{Error, Result};
pub use format_error::{ErrorFormatter, create_format_error};
pub use registry::{BundlerMap, SourceMapLookup};
