use rocket::{serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        auth::AdminSession,
        election::{
            ElectionId, ElectionResults, ElectionSpec, ElectionStart, ElectionSummary,
            ElectionView, Elections, TallySpec, VisibilityOutcome,
        },
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        list_elections,
        start_election,
        end_election,
        publish_results,
        record_tally,
    ]
}

#[get("/admin/elections")]
async fn list_elections(
    _session: AdminSession,
    elections: Elections,
) -> Result<Json<Vec<ElectionSummary>>> {
    Ok(Json(elections.list().await?))
}

#[post("/admin/elections", data = "<spec>", format = "json")]
async fn start_election(
    _session: AdminSession,
    spec: Json<ElectionSpec>,
    elections: Elections,
) -> Result<Json<ElectionStart>> {
    Ok(Json(elections.start(spec.0).await?))
}

#[post("/admin/elections/end")]
async fn end_election(_session: AdminSession, elections: Elections) -> Result<Json<ElectionView>> {
    Ok(Json(elections.end().await?.into()))
}

#[post("/admin/elections/<election_id>/results")]
async fn publish_results(
    _session: AdminSession,
    election_id: ElectionId,
    elections: Elections,
) -> Result<Json<VisibilityOutcome>> {
    Ok(Json(elections.set_results_visibility(election_id).await?))
}

#[put("/admin/elections/<election_id>/tally", data = "<tally>", format = "json")]
async fn record_tally(
    _session: AdminSession,
    election_id: ElectionId,
    tally: Json<TallySpec>,
    elections: Elections,
) -> Result<Json<ElectionResults>> {
    let election = elections.record_tally(election_id, tally.0).await?;
    let tally = election.tally().unwrap_or_default();
    Ok(Json((election, tally).into()))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::json,
    };

    use crate::model::{
        election::{CandidateSpec, ElectionState, Tally},
        store::Db,
    };

    use super::*;

    async fn start(client: &Client, spec: &ElectionSpec) -> Status {
        client
            .post(uri!(start_election))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await
            .status()
    }

    #[backend_test(admin)]
    async fn start_and_list(client: Client) {
        let mut spec = ElectionSpec::example(1);
        spec.candidates.push(CandidateSpec {
            name: Some("C".to_string()),
            id: 3,
            symbol: None,
        });

        let response = client
            .post(uri!(start_election))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let started = response.into_json::<ElectionStart>().await.unwrap();
        assert_eq!(started.skipped_candidates, 1);
        assert_eq!(started.elections.len(), 1);
        assert_eq!(started.elections[0].candidates, vec!["A", "B"]);
        assert_eq!(started.elections[0].election.state, ElectionState::Ongoing);

        let response = client.get(uri!(list_elections)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let listed = response
            .into_json::<Vec<ElectionSummary>>()
            .await
            .unwrap();
        assert_eq!(listed, started.elections);
    }

    #[backend_test(admin)]
    async fn second_ongoing_election_conflicts(client: Client) {
        assert_eq!(Status::Ok, start(&client, &ElectionSpec::example(1)).await);
        assert_eq!(
            Status::Conflict,
            start(&client, &ElectionSpec::example(2)).await
        );
    }

    #[backend_test(admin)]
    async fn election_accepts_form_times(client: Client) {
        let body = json!({
            "id": 1,
            "start_time": "2024-02-08T09:00",
            "end_time": "17:30",
            "candidates": [{ "name": "A", "id": 1, "symbol": "x" }],
        });
        let response = client
            .post(uri!(start_election))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test(admin)]
    async fn election_without_candidates_is_invalid(client: Client) {
        let mut spec = ElectionSpec::example(1);
        spec.candidates.clear();
        assert_eq!(Status::UnprocessableEntity, start(&client, &spec).await);
    }

    #[backend_test(admin)]
    async fn end_then_publish(client: Client) {
        // Nothing to end yet
        let response = client.post(uri!(end_election)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        start(&client, &ElectionSpec::example(1)).await;

        // Publishing an ongoing election is skipped
        let response = client.post(uri!(publish_results(1))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(
            Some(VisibilityOutcome::Skipped),
            response.into_json::<VisibilityOutcome>().await
        );

        let response = client.post(uri!(end_election)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let ended = response.into_json::<ElectionView>().await.unwrap();
        assert_eq!(ended.state, ElectionState::Closed);

        let response = client.post(uri!(publish_results(1))).dispatch().await;
        assert_eq!(
            Some(VisibilityOutcome::Success),
            response.into_json::<VisibilityOutcome>().await
        );

        let response = client.post(uri!(publish_results(7))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(admin)]
    async fn end_reports_a_stuck_lower_id(client: Client) {
        start(&client, &ElectionSpec::example(5)).await;
        client.post(uri!(end_election)).dispatch().await;
        assert_eq!(Status::Ok, start(&client, &ElectionSpec::example(3)).await);

        let response = client.post(uri!(end_election)).dispatch().await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test(admin)]
    async fn tally_after_close(client: Client) {
        start(&client, &ElectionSpec::example(1)).await;
        let tally = Tally {
            encrypted_sum: Some("c3Vt".to_string()),
            combined_randomness: Some("cmFuZA==".to_string()),
            decrypted_tally: Some("[3, 4]".to_string()),
        };

        let response = client
            .put(uri!(record_tally(1)))
            .header(ContentType::JSON)
            .body(json!(tally).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());

        client.post(uri!(end_election)).dispatch().await;
        let response = client
            .put(uri!(record_tally(1)))
            .header(ContentType::JSON)
            .body(json!(tally).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let results = response.into_json::<ElectionResults>().await.unwrap();
        assert_eq!(results.tally, tally);
    }

    #[backend_test]
    async fn routes_require_admin(client: Client, db: Db) {
        let response = client.get(uri!(list_elections)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());

        assert_eq!(
            Status::Unauthorized,
            start(&client, &ElectionSpec::example(1)).await
        );
        assert!(Elections::new(db).latest().await.unwrap().is_none());

        let response = client.post(uri!(end_election)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
