//! Configuration section definitions.
//!
//! Each module corresponds to a section in `rebundle.toml`:
//!
//! | Module   | TOML Section | Purpose                                  |
//! |----------|--------------|------------------------------------------|
//! | `bundle` | `[bundle]`   | Test discovery, single vs per-file mode  |
//! | `serve`  | `[serve]`    | Test server                              |
//!
//! `[build]` deserializes straight into [`BuildOptions`](crate::backend::BuildOptions).

mod bundle;
mod serve;

pub use bundle::BundleConfig;
pub use serve::ServeConfig;
