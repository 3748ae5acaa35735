pub mod history;
pub mod resolution;
pub mod state;

pub use resolution::ResolutionEngine;
pub use state::{ResolutionAction, ResolutionRequest, ResolutionResult};
