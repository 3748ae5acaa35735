pub mod parser;

pub use parser::{Intent, IntentParser, IntentVerb};
