use rocket::{serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        election::{ElectionId, ElectionResults, ElectionView, Elections},
        vote::{PublishedVotes, Vote, Votes},
    },
};

pub fn routes() -> Vec<Route> {
    routes![latest_election, election_votes, published_votes, results]
}

#[get("/elections/latest")]
async fn latest_election(elections: Elections) -> Result<Json<ElectionView>> {
    elections
        .latest()
        .await?
        .map(|election| Json(election.into()))
        .ok_or_else(|| Error::not_found("No elections"))
}

/// Votes cast in an election. Hidden until the election's results are visible.
#[get("/elections/<election_id>/votes")]
async fn election_votes(
    election_id: ElectionId,
    elections: Elections,
    votes: Votes,
) -> Result<Json<Vec<Vote>>> {
    let election = elections.get(election_id).await?;
    if !election.results_visibility {
        return Err(Error::not_found(format!(
            "Visible results for election {election_id}"
        )));
    }
    Ok(Json(votes.for_election(election_id).await?))
}

#[get("/votes")]
async fn published_votes(votes: Votes) -> Result<Json<PublishedVotes>> {
    let (election, votes) = votes.published().await?;
    Ok(Json(PublishedVotes {
        election: election.into(),
        votes,
    }))
}

#[get("/results")]
async fn results(elections: Elections) -> Result<Json<ElectionResults>> {
    Ok(Json(elections.results().await?.into()))
}
