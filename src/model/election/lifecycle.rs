use chrono::Utc;
use log::{debug, error, info, warn};
use mongodb::bson::doc;
use rocket::request::{self, FromRequest, Request};

use crate::{
    error::{Error, Result},
    model::store::{Db, Filter, Query, StoreError, Table, WriteStatus},
};

use super::{
    row::{Candidate, Election, ElectionId, ElectionState, ElectionSummary},
    spec::{ElectionSpec, ElectionStart, TallySpec, VisibilityOutcome},
};

/// The election lifecycle manager.
///
/// Each election moves `Ongoing -> Closed -> ResultsPublished`, and at most
/// one election is ongoing at any time. The ongoing check here gives callers
/// a clean [`Error::Conflict`]; the store's partial unique index on
/// `ongoing` is what actually holds the line against concurrent starts.
#[derive(Clone)]
pub struct Elections {
    db: Db,
}

impl Elections {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Start a new election with the given candidates.
    pub async fn start(&self, spec: ElectionSpec) -> Result<ElectionStart> {
        if let Some(ongoing) = self.ongoing().await? {
            return Err(Error::Conflict(format!(
                "Election {} is already ongoing",
                ongoing.id
            )));
        }

        let candidates: Vec<Candidate> = spec
            .candidates
            .iter()
            .filter_map(|entry| entry.accept(spec.id))
            .collect();
        let skipped_candidates = spec.candidates.len() - candidates.len();
        if skipped_candidates > 0 {
            warn!(
                "Election {}: skipped {skipped_candidates} candidate entries without a name or symbol",
                spec.id
            );
        }
        if candidates.is_empty() {
            return Err(Error::Validation(format!(
                "Election {} has no complete candidate entries",
                spec.id
            )));
        }

        let election = Election {
            id: spec.id,
            num_candidates: candidates.len() as u32,
            start_time: spec.start_time,
            end_time: spec.end_time,
            ongoing: true,
            results_visibility: false,
            encrypted_sum: None,
            combined_randomness: None,
            decrypted_tally: None,
            created_at: Utc::now(),
        };
        self.db
            .insert_rows(Table::Elections, &[&election])
            .await
            .map_err(|e| conflict_on_duplicate(e, spec.id))?;

        // No multi-table transaction; undo the election row if the candidates don't land.
        if let Err(e) = self.db.insert_rows(Table::Candidates, &candidates).await {
            warn!("Failed to store candidates for election {}, removing it: {e}", spec.id);
            if let Err(cleanup) = self
                .db
                .delete(Table::Elections, Filter::by("id", spec.id))
                .await
            {
                error!(
                    "Election {} left without candidates, failed to remove it: {cleanup}",
                    spec.id
                );
            }
            return Err(e.into());
        }

        info!(
            "Started election {} with {} candidates",
            spec.id,
            candidates.len()
        );
        Ok(ElectionStart {
            elections: self.list().await?,
            skipped_candidates,
        })
    }

    /// Close the election with the highest ID.
    ///
    /// Fails with [`Error::Conflict`] if that election is already closed while
    /// another one is still ongoing.
    pub async fn end(&self) -> Result<Election> {
        let latest: Election = self
            .db
            .first_row(Table::Elections, Query::new(Filter::all()).newest_first("id"))
            .await?
            .ok_or_else(|| Error::not_found("No elections"))?;

        // Another election may be ongoing under a lower ID; closing the highest would be a no-op.
        if !latest.ongoing {
            if let Some(ongoing) = self.ongoing().await? {
                return Err(Error::Conflict(format!(
                    "Election {} is ongoing but election {} has the highest ID",
                    ongoing.id, latest.id
                )));
            }
        }

        let written = self
            .db
            .update(
                Table::Elections,
                doc! { "ongoing": false },
                Filter::by("id", latest.id),
            )
            .await?;
        if written.status != WriteStatus::Updated {
            return Err(Error::Store(StoreError::Unavailable(format!(
                "Failed to close election {}",
                latest.id
            ))));
        }

        info!("Ended election {}", latest.id);
        Ok(Election {
            ongoing: false,
            ..latest
        })
    }

    /// Make an election's results visible, unless it is still ongoing.
    pub async fn set_results_visibility(&self, id: ElectionId) -> Result<VisibilityOutcome> {
        let election = self.get(id).await?;
        if election.ongoing {
            debug!("Election {id} is still ongoing; not publishing results");
            return Ok(VisibilityOutcome::Skipped);
        }

        // Conditional on `ongoing` so a concurrent reopen can't publish an ongoing election.
        let written = self
            .db
            .update(
                Table::Elections,
                doc! { "results_visibility": true },
                Filter::by("id", id).eq("ongoing", false),
            )
            .await?;
        match written.status {
            WriteStatus::Updated => {
                info!("Results of election {id} are now visible");
                Ok(VisibilityOutcome::Success)
            }
            _ => Err(Error::Store(StoreError::Unavailable(format!(
                "Failed to update results visibility for election {id}"
            )))),
        }
    }

    /// Every election, newest first, with the names of its candidates.
    pub async fn list(&self) -> Result<Vec<ElectionSummary>> {
        let elections: Vec<Election> = self
            .db
            .select_rows(
                Table::Elections,
                Query::new(Filter::all()).newest_first("created_at"),
            )
            .await?;

        let mut summaries = Vec::with_capacity(elections.len());
        for election in elections {
            let candidates = self
                .candidates(election.id)
                .await?
                .into_iter()
                .map(|candidate| candidate.name)
                .collect();
            summaries.push(ElectionSummary {
                election: election.into(),
                candidates,
            });
        }
        Ok(summaries)
    }

    /// The most recently created election, if there is one.
    pub async fn latest(&self) -> Result<Option<Election>> {
        Ok(self
            .db
            .first_row(
                Table::Elections,
                Query::new(Filter::all()).newest_first("created_at"),
            )
            .await?)
    }

    /// The election with the given ID.
    pub async fn get(&self, id: ElectionId) -> Result<Election> {
        self.db
            .first_row(Table::Elections, Query::new(Filter::by("id", id)))
            .await?
            .ok_or_else(|| Error::not_found(format!("Election {id}")))
    }

    /// The currently ongoing election, if there is one.
    pub async fn ongoing(&self) -> Result<Option<Election>> {
        Ok(self
            .db
            .first_row(Table::Elections, Query::new(Filter::by("ongoing", true)))
            .await?)
    }

    /// The candidates standing in the given election, in the order they were entered.
    pub async fn candidates(&self, id: ElectionId) -> Result<Vec<Candidate>> {
        Ok(self
            .db
            .select_rows(Table::Candidates, Query::new(Filter::by("election_id", id)))
            .await?)
    }

    /// The first election whose results are visible.
    pub async fn visible(&self) -> Result<Option<Election>> {
        Ok(self
            .db
            .first_row(
                Table::Elections,
                Query::new(Filter::by("results_visibility", true)),
            )
            .await?)
    }

    /// Store the externally computed tally of a finished election.
    pub async fn record_tally(&self, id: ElectionId, tally: TallySpec) -> Result<Election> {
        let election = self.get(id).await?;
        if election.ongoing {
            return Err(Error::Validation(format!(
                "Election {id} is still ongoing; it cannot be tallied"
            )));
        }

        let patch = doc! {
            "encrypted_sum": tally.encrypted_sum.clone(),
            "combined_randomness": tally.combined_randomness.clone(),
            "decrypted_tally": tally.decrypted_tally.clone(),
        };
        let written = self
            .db
            .update(Table::Elections, patch, Filter::by("id", id))
            .await?;
        if written.status != WriteStatus::Updated {
            return Err(Error::Store(StoreError::Unavailable(format!(
                "Failed to record tally for election {id}"
            ))));
        }

        info!("Recorded tally for election {id}");
        Ok(Election {
            encrypted_sum: tally.encrypted_sum,
            combined_randomness: tally.combined_randomness,
            decrypted_tally: tally.decrypted_tally,
            ..election
        })
    }

    /// The tally of the latest election, once its results are published.
    pub async fn results(&self) -> Result<(Election, TallySpec)> {
        let election = self
            .latest()
            .await?
            .filter(|election| election.state() == ElectionState::ResultsPublished)
            .ok_or_else(|| Error::not_found("No published results"))?;
        let tally = election
            .tally()
            .ok_or_else(|| Error::not_found(format!("Tally for election {}", election.id)))?;
        Ok((election, tally))
    }
}

/// A duplicate key on insert means either the ID is taken or another
/// election became ongoing since we checked.
fn conflict_on_duplicate(err: StoreError, id: ElectionId) -> Error {
    match err {
        StoreError::DuplicateKey(index) => Error::Conflict(format!(
            "Election {id} conflicts with an existing election ({index})"
        )),
        other => other.into(),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Elections {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        req.guard::<Db>().await.map(Elections::new)
    }
}
