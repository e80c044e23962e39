//! HTTP request handlers.

pub mod artifacts;
pub mod health;
pub mod uploads;

pub use artifacts::*;
pub use health::*;
pub use uploads::*;
