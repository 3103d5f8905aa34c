mod ballot_box;
mod row;

pub use ballot_box::Votes;
pub use row::{BallotId, BallotSubmission, PublishedVotes, Vote, VoterEntry, VoterLogin};
