use chrono::{DateTime, Utc};
use log::{debug, info};
use rocket::request::{self, FromRequest, Request};

use crate::{
    error::{Error, Result},
    logging::Masked,
    model::{
        election::{Election, ElectionId, ElectionState, Elections},
        store::{Db, Filter, Query, StoreError, Table, WriteStatus},
    },
};

use super::row::{BallotSubmission, Vote, VoterEntry};

/// The vote store: one vote per voter per election.
#[derive(Clone)]
pub struct Votes {
    db: Db,
    elections: Elections,
}

impl Votes {
    pub fn new(db: Db) -> Self {
        Self {
            elections: Elections::new(db.clone()),
            db,
        }
    }

    /// The vote this voter cast in the given election, if any.
    pub async fn has_voted(&self, cnic: &str, election_id: ElectionId) -> Result<Option<Vote>> {
        Ok(self
            .db
            .first_row(
                Table::Votes,
                Query::new(Filter::by("cnic", cnic).eq("election_id", election_id)),
            )
            .await?)
    }

    /// Record a vote cast at `timestamp`, which must be an RFC 3339 timestamp
    /// with an explicit offset.
    ///
    /// This does not check [`Votes::has_voted`] first. A second vote by the
    /// same voter is still refused by the store's unique index, and surfaces
    /// as [`Error::Conflict`].
    pub async fn cast(
        &self,
        cnic: &str,
        ballot: BallotSubmission,
        timestamp: &str,
    ) -> Result<Vote> {
        let time = DateTime::parse_from_rfc3339(timestamp).map_err(|e| {
            Error::Validation(format!(
                "Vote time {timestamp:?} must be an RFC 3339 timestamp with a timezone: {e}"
            ))
        })?;
        if cnic.trim().is_empty() {
            return Err(Error::Validation("CNIC must not be empty".to_string()));
        }

        let vote = ballot.into_vote(cnic.to_string(), time);
        let written = self
            .db
            .insert_rows(Table::Votes, &[&vote])
            .await
            .map_err(|e| match e {
                StoreError::DuplicateKey(_) => Error::Conflict(format!(
                    "Voter has already voted in election {}",
                    vote.election_id
                )),
                other => other.into(),
            })?;
        if written.status != WriteStatus::Created {
            return Err(Error::Store(StoreError::Unavailable(format!(
                "Vote for election {} was not stored",
                vote.election_id
            ))));
        }

        info!(
            "Stored ballot {} for election {}",
            vote.ballot_id, vote.election_id
        );
        Ok(vote)
    }

    /// Every vote cast in the given election.
    pub async fn for_election(&self, election_id: ElectionId) -> Result<Vec<Vote>> {
        Ok(self
            .db
            .select_rows(
                Table::Votes,
                Query::new(Filter::by("election_id", election_id)),
            )
            .await?)
    }

    /// Cast a voter's ballot now, enforcing the voting policy: the election
    /// must be ongoing, and the voter must not have voted in it yet.
    pub async fn submit(&self, cnic: &str, ballot: BallotSubmission) -> Result<Vote> {
        let election = self.elections.get(ballot.election_id).await?;
        if !election.ongoing {
            return Err(Error::Validation(format!(
                "Election {} is not accepting votes",
                election.id
            )));
        }
        if self.has_voted(cnic, election.id).await?.is_some() {
            return Err(Error::Conflict(format!(
                "Voter has already voted in election {}",
                election.id
            )));
        }

        self.cast(cnic, ballot, &Utc::now().to_rfc3339()).await
    }

    /// Decide what a voter entering with their CNIC gets to see, based on the
    /// latest election.
    pub async fn entry(&self, cnic: &str) -> Result<VoterEntry> {
        let election = match self.elections.latest().await? {
            Some(election) => election,
            None => return Ok(VoterEntry::Closed),
        };

        let election_id = election.id;
        let entry = match election.state() {
            ElectionState::Ongoing => match self.has_voted(cnic, election.id).await? {
                Some(vote) => VoterEntry::Receipt { vote },
                None => VoterEntry::Ballot {
                    candidates: self.elections.candidates(election.id).await?,
                    election: election.into(),
                },
            },
            ElectionState::ResultsPublished => VoterEntry::Results {
                election: election.into(),
            },
            ElectionState::Closed => VoterEntry::Closed,
        };
        debug!(
            "Voter {} entered election {}: {}",
            Masked(cnic),
            election_id,
            entry.view_name()
        );
        Ok(entry)
    }

    /// The election whose results are visible, and every vote cast in it.
    pub async fn published(&self) -> Result<(Election, Vec<Vote>)> {
        let election = self
            .elections
            .visible()
            .await?
            .ok_or_else(|| Error::not_found("No election with visible results"))?;
        let votes = self.for_election(election.id).await?;
        Ok((election, votes))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Votes {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        req.guard::<Db>().await.map(Votes::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{election::ElectionSpec, store::MemoryStore};

    const CNIC: &str = "12345";
    const CAST_AT: &str = "2024-02-08T10:15:00+05:00";

    /// A vote store with election 1 ongoing.
    async fn votes() -> Votes {
        let db = Db::new(MemoryStore::new());
        Elections::new(db.clone())
            .start(ElectionSpec::example(1))
            .await
            .unwrap();
        Votes::new(db)
    }

    #[rocket::async_test]
    async fn cast_then_has_voted() {
        let votes = votes().await;
        assert_eq!(votes.has_voted(CNIC, 1).await.unwrap(), None);

        let cast = votes
            .cast(CNIC, BallotSubmission::example(1), CAST_AT)
            .await
            .unwrap();
        assert_eq!(votes.has_voted(CNIC, 1).await.unwrap(), Some(cast.clone()));
        assert_eq!(cast.time.to_rfc3339(), CAST_AT);

        // Other voters and other elections are unaffected.
        assert_eq!(votes.has_voted("67890", 1).await.unwrap(), None);
        assert_eq!(votes.has_voted(CNIC, 2).await.unwrap(), None);
    }

    #[rocket::async_test]
    async fn timestamp_without_timezone_is_rejected() {
        let votes = votes().await;
        for bad in ["2024-02-08T10:15:00", "2024-02-08 10:15", "yesterday"] {
            let result = votes.cast(CNIC, BallotSubmission::example(1), bad).await;
            assert!(matches!(result, Err(Error::Validation(_))), "{bad}");
        }
        assert!(votes.for_election(1).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn duplicate_cast_is_a_conflict() {
        let votes = votes().await;
        votes
            .cast(CNIC, BallotSubmission::example(1), CAST_AT)
            .await
            .unwrap();

        let again = votes
            .cast(CNIC, BallotSubmission::example(1), CAST_AT)
            .await;
        assert!(matches!(again, Err(Error::Conflict(_))));
        assert_eq!(votes.for_election(1).await.unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn submit_enforces_policy() {
        let votes = votes().await;

        let first = votes.submit(CNIC, BallotSubmission::example(1)).await.unwrap();
        assert_eq!(first.election_id, 1);

        let second = votes.submit(CNIC, BallotSubmission::example(1)).await;
        assert!(matches!(second, Err(Error::Conflict(_))));

        let unknown = votes.submit("67890", BallotSubmission::example(9)).await;
        assert!(matches!(unknown, Err(Error::NotFound(_))));

        votes.elections.end().await.unwrap();
        let late = votes.submit("67890", BallotSubmission::example(1)).await;
        assert!(matches!(late, Err(Error::Validation(_))));
    }

    #[rocket::async_test]
    async fn entry_follows_the_latest_election() {
        let db = Db::new(MemoryStore::new());
        let votes = Votes::new(db.clone());
        assert_eq!(votes.entry(CNIC).await.unwrap(), VoterEntry::Closed);

        let elections = Elections::new(db);
        elections.start(ElectionSpec::example(1)).await.unwrap();
        match votes.entry(CNIC).await.unwrap() {
            VoterEntry::Ballot {
                election,
                candidates,
            } => {
                assert_eq!(election.id, 1);
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected a ballot, got {other:?}"),
        }

        let vote = votes.submit(CNIC, BallotSubmission::example(1)).await.unwrap();
        assert_eq!(
            votes.entry(CNIC).await.unwrap(),
            VoterEntry::Receipt { vote }
        );

        elections.end().await.unwrap();
        assert_eq!(votes.entry(CNIC).await.unwrap(), VoterEntry::Closed);

        elections.set_results_visibility(1).await.unwrap();
        assert!(matches!(
            votes.entry(CNIC).await.unwrap(),
            VoterEntry::Results { .. }
        ));
    }

    #[rocket::async_test]
    async fn published_votes_need_visible_results() {
        let votes = votes().await;
        assert!(matches!(votes.published().await, Err(Error::NotFound(_))));

        votes.elections.end().await.unwrap();
        votes.elections.set_results_visibility(1).await.unwrap();
        let (election, cast) = votes.published().await.unwrap();
        assert_eq!(election.id, 1);
        assert!(cast.is_empty());
    }
}
