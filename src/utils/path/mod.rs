//! Path and URL utilities.
//!
//! Pure functions for path manipulation. No side effects.
//!
//! - [`fs`]: Lexical path normalization (`normalize`, `absolutize`, `relative_import`)
//! - [`route`]: URL utilities (`decode_url`, `strip_query`)

pub mod fs;
pub mod route;

pub use fs::{absolutize, normalize};
