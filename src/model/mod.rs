pub mod binding;
pub mod common;
pub mod instance;

pub use binding::*;
pub use common::*;
pub use instance::*;
