//! Domain models for the clinic record store.

mod catalog;
mod party;
mod visit;

pub use catalog::*;
pub use party::*;
pub use visit::*;
