//! Basic utilities: error types and frame-index ordering.

mod error;
mod index;

pub use error::{Error, Result};
pub use index::FrameIndex;
