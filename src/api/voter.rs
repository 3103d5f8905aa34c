use rocket::{serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        auth::VoterSession,
        election::Elections,
        vote::{BallotSubmission, Vote, Votes},
    },
};

pub fn routes() -> Vec<Route> {
    routes![receipt, vote]
}

/// The logged-in voter's vote in the ongoing election.
#[get("/voter/receipt")]
async fn receipt(session: VoterSession, elections: Elections, votes: Votes) -> Result<Json<Vote>> {
    let election = elections
        .ongoing()
        .await?
        .ok_or_else(|| Error::not_found("No ongoing election"))?;
    votes
        .has_voted(session.subject(), election.id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("Receipt for election {}", election.id)))
}

#[post("/voter/vote", data = "<ballot>", format = "json")]
async fn vote(session: VoterSession, ballot: Json<BallotSubmission>, votes: Votes) -> Result<Json<Vote>> {
    Ok(Json(votes.submit(session.subject(), ballot.0).await?))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::json,
    };

    use crate::model::{election::ElectionSpec, store::Db};

    use super::*;

    const CNIC: &str = "35202-1234567-1";

    async fn login(client: &Client) {
        let response = client
            .post(uri!(crate::api::auth::voter_login))
            .header(ContentType::JSON)
            .body(json!({ "cnic": CNIC }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    async fn cast(client: &Client, ballot: &BallotSubmission) -> Status {
        client
            .post(uri!(vote))
            .header(ContentType::JSON)
            .body(json!(ballot).to_string())
            .dispatch()
            .await
            .status()
    }

    #[backend_test]
    async fn vote_then_receipt(client: Client, db: Db) {
        Elections::new(db).start(ElectionSpec::example(1)).await.unwrap();
        login(&client).await;

        let response = client.get(uri!(receipt)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        let response = client
            .post(uri!(vote))
            .header(ContentType::JSON)
            .body(json!(BallotSubmission::example(1)).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let cast = response.into_json::<Vote>().await.unwrap();
        assert_eq!(cast.cnic, CNIC);
        assert_eq!(cast.election_id, 1);

        let response = client.get(uri!(receipt)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(Some(cast), response.into_json::<Vote>().await);
    }

    #[backend_test]
    async fn second_vote_conflicts(client: Client, db: Db) {
        Elections::new(db).start(ElectionSpec::example(1)).await.unwrap();
        login(&client).await;

        assert_eq!(Status::Ok, cast(&client, &BallotSubmission::example(1)).await);
        assert_eq!(
            Status::Conflict,
            cast(&client, &BallotSubmission::example(1)).await
        );
    }

    #[backend_test]
    async fn closed_election_rejects_votes(client: Client, db: Db) {
        let elections = Elections::new(db);
        elections.start(ElectionSpec::example(1)).await.unwrap();
        login(&client).await;
        elections.end().await.unwrap();

        assert_eq!(
            Status::UnprocessableEntity,
            cast(&client, &BallotSubmission::example(1)).await
        );
        assert_eq!(
            Status::NotFound,
            cast(&client, &BallotSubmission::example(2)).await
        );
    }

    #[backend_test]
    async fn voting_requires_login(client: Client, db: Db) {
        Elections::new(db).start(ElectionSpec::example(1)).await.unwrap();

        assert_eq!(
            Status::Unauthorized,
            cast(&client, &BallotSubmission::example(1)).await
        );
        let response = client.get(uri!(receipt)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
