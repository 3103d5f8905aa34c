mod lifecycle;
mod row;
mod spec;

pub use lifecycle::Elections;
pub use row::{
    Candidate, CandidateId, Election, ElectionId, ElectionResults, ElectionState, ElectionSummary,
    ElectionView, Tally,
};
pub use spec::{CandidateSpec, ElectionSpec, ElectionStart, TallySpec, VisibilityOutcome};
