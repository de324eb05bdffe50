//! Persistence seam for finished matches

pub mod results;

pub use results::{MatchRecorder, MatchResult, RecentResults};
