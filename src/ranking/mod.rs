pub mod ranker;

pub use ranker::{CandidateRanker, RankedOutcome};
