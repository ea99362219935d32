mod oracle;
mod queue;
mod response;

pub use oracle::{GroqOracle, RawScore, ScoreRequest, ScoringOracle};
pub use queue::{EvalSettings, EvalStats, EvaluationQueue};
pub use response::{validate, ValidatedScore};
