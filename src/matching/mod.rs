pub mod domain;
pub mod engine;

pub use domain::{like_key, LikeOutcome, LikeProfile, MatchError, PairKey};
pub use engine::MatchEngine;
