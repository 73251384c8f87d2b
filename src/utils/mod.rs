//! Utility modules shared by the bundler core and the host layer.

pub mod hash;
pub mod path;
