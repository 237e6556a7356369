//! API request handlers

mod health;
mod lifecycle;
mod pipeline;
mod workflows;

pub use health::*;
pub use lifecycle::*;
pub use pipeline::*;
pub use workflows::*;
