use chrono::{DateTime, NaiveTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

/// Election IDs are assigned by the administrator who creates the election.
pub type ElectionId = i64;
/// Candidate IDs are assigned by the administrator too.
pub type CandidateId = i64;

/// States in the election lifecycle. Derived from the stored flags, never stored itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    /// Accepting votes.
    Ongoing,
    /// Voting over, results still hidden.
    Closed,
    /// Voting over, encrypted votes and tally disclosed. Terminal.
    ResultsPublished,
}

/// An election, as stored in the `elections` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    pub id: ElectionId,
    pub num_candidates: u32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub ongoing: bool,
    pub results_visibility: bool,
    /// Tally fields, filled in by external tooling once voting is over.
    pub encrypted_sum: Option<String>,
    pub combined_randomness: Option<String>,
    pub decrypted_tally: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Election {
    pub fn state(&self) -> ElectionState {
        match (self.ongoing, self.results_visibility) {
            (true, _) => ElectionState::Ongoing,
            (false, false) => ElectionState::Closed,
            (false, true) => ElectionState::ResultsPublished,
        }
    }

    /// The externally computed tally fields, if any of them have been recorded.
    pub fn tally(&self) -> Option<Tally> {
        if self.encrypted_sum.is_none()
            && self.combined_randomness.is_none()
            && self.decrypted_tally.is_none()
        {
            return None;
        }
        Some(Tally {
            encrypted_sum: self.encrypted_sum.clone(),
            combined_randomness: self.combined_randomness.clone(),
            decrypted_tally: self.decrypted_tally.clone(),
        })
    }
}

/// A candidate, as stored in the `candidates` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub election_id: ElectionId,
    pub name: String,
    pub cand_id: CandidateId,
    pub symbol: String,
}

/// The aggregation outputs of an election. Opaque to this server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub encrypted_sum: Option<String>,
    pub combined_randomness: Option<String>,
    pub decrypted_tally: Option<String>,
}

/// An election together with the names of its candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    #[serde(flatten)]
    pub election: ElectionView,
    pub candidates: Vec<String>,
}

/// The JSON face of an [`Election`]: timestamps as RFC 3339 strings, with
/// the derived state alongside the flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionView {
    pub id: ElectionId,
    pub num_candidates: u32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub ongoing: bool,
    pub results_visibility: bool,
    pub state: ElectionState,
    pub created_at: DateTime<Utc>,
}

impl From<Election> for ElectionView {
    fn from(election: Election) -> Self {
        Self {
            state: election.state(),
            id: election.id,
            num_candidates: election.num_candidates,
            start_time: election.start_time,
            end_time: election.end_time,
            ongoing: election.ongoing,
            results_visibility: election.results_visibility,
            created_at: election.created_at,
        }
    }
}

/// A finished election with its tally, once its results are out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election: ElectionView,
    pub tally: Tally,
}

impl From<(Election, Tally)> for ElectionResults {
    fn from((election, tally): (Election, Tally)) -> Self {
        Self {
            election: election.into(),
            tally,
        }
    }
}
