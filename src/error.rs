use thiserror::Error;

/// Contract violations reported by the call-graph searches.
#[derive(Debug, Error, Eq, PartialEq)]
pub(crate) enum SearchError {
    #[error("common caller search needs two non-empty candidate lists (got {left} and {right})")]
    EmptyCandidates { left: usize, right: usize },
}
