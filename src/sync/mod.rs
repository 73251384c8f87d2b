//! Async coordination primitives.
//!
//! - `deferred` - manually settled future with forward chaining
//! - `debounce` - trailing-window coalescing around a shared promise

mod debounce;
mod deferred;

pub use debounce::Debounce;
pub use deferred::{Deferred, Promise};
