use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::model::election::{Candidate, ElectionId, ElectionView};

/// Ballot IDs are generated by the voting client.
pub type BallotId = i64;

/// A cast vote, as stored in the `votes` table. Doubles as the voter's receipt.
///
/// The encrypted vote, its hash and the randomness are produced by the client
/// and are opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub cnic: String,
    pub ballot_id: BallotId,
    pub election_id: ElectionId,
    pub encrypted_vote: String,
    pub vote_hash: String,
    pub randomness: String,
    /// When the vote was cast. Always carries an explicit UTC offset, and is
    /// stored as an RFC 3339 string.
    pub time: DateTime<FixedOffset>,
}

/// The ballot a voter submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotSubmission {
    pub ballot_id: BallotId,
    pub election_id: ElectionId,
    #[serde(alias = "encryption")]
    pub encrypted_vote: String,
    #[serde(alias = "hash_value")]
    pub vote_hash: String,
    #[serde(alias = "random_factor")]
    pub randomness: String,
}

impl BallotSubmission {
    pub fn into_vote(self, cnic: String, time: DateTime<FixedOffset>) -> Vote {
        Vote {
            cnic,
            ballot_id: self.ballot_id,
            election_id: self.election_id,
            encrypted_vote: self.encrypted_vote,
            vote_hash: self.vote_hash,
            randomness: self.randomness,
            time,
        }
    }
}

/// What a voter is shown on entering with their CNIC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum VoterEntry {
    /// They already voted in the ongoing election: here is their vote.
    Receipt { vote: Vote },
    /// They may vote in the ongoing election.
    Ballot {
        election: ElectionView,
        candidates: Vec<Candidate>,
    },
    /// Voting is over and results are out.
    Results { election: ElectionView },
    /// Nothing to do: no election, or one that is closed with results hidden.
    Closed,
}

impl VoterEntry {
    /// The `view` tag this entry serialises with.
    pub fn view_name(&self) -> &'static str {
        match self {
            Self::Receipt { .. } => "receipt",
            Self::Ballot { .. } => "ballot",
            Self::Results { .. } => "results",
            Self::Closed => "closed",
        }
    }
}

/// Every vote of the election whose results are visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedVotes {
    pub election: ElectionView,
    pub votes: Vec<Vote>,
}

/// A voter identifying themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterLogin {
    pub cnic: String,
}


#[cfg(test)]
mod tests {
    use super::*;

    use mongodb::bson;
    use rocket::serde::json::{from_str, json};

    #[test]
    fn time_is_stored_with_its_offset() {
        let time = DateTime::parse_from_rfc3339("2024-02-08T10:15:00+05:00").unwrap();
        let vote = BallotSubmission::example(1).into_vote("12345".to_string(), time);
        let row = bson::to_document(&vote).unwrap();
        assert_eq!(row.get_str("time").unwrap(), "2024-02-08T10:15:00+05:00");

        let back: Vote = bson::from_document(row).unwrap();
        assert_eq!(back.time, time);
    }

    #[test]
    fn accepts_form_field_names() {
        let raw = json!({
            "ballot_id": 3,
            "election_id": 1,
            "encryption": "e",
            "hash_value": "h",
            "random_factor": "r",
        })
        .to_string();
        let ballot: BallotSubmission = from_str(&raw).unwrap();
        assert_eq!(ballot.encrypted_vote, "e");
        assert_eq!(ballot.vote_hash, "h");
        assert_eq!(ballot.randomness, "r");
    }

    #[test]
    fn view_name_matches_serialised_tag() {
        let time = DateTime::parse_from_rfc3339("2024-02-08T10:15:00+05:00").unwrap();
        let receipt = VoterEntry::Receipt {
            vote: BallotSubmission::example(1).into_vote("12345".to_string(), time),
        };
        for entry in [receipt, VoterEntry::Closed] {
            let value = rocket::serde::json::serde_json::to_value(&entry).unwrap();
            assert_eq!(value["view"], entry.view_name());
        }
    }
}
