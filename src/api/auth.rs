use rocket::{http::CookieJar, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        admin::{verify_admin, AdminCredentials},
        auth::{end_sessions, AdminSession, VoterSession},
        store::Db,
        vote::{VoterEntry, VoterLogin, Votes},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![admin_login, voter_login, logout]
}

#[post("/admin/login", data = "<credentials>", format = "json")]
pub async fn admin_login(
    cookies: &CookieJar<'_>,
    credentials: Json<AdminCredentials>,
    db: Db,
    config: &State<Config>,
) -> Result<()> {
    let admin = verify_admin(&db, &credentials.username, &credentials.password)
        .await
        .map_err(|err| match err {
            Error::NotFound(_) | Error::Conflict(_) => Error::Unauthorized(
                "No admin found with the provided username and password combination.".to_string(),
            ),
            other => other,
        })?;

    AdminSession::start(cookies, admin.username, config);
    Ok(())
}

#[post("/voter/login", data = "<login>", format = "json")]
pub async fn voter_login(
    cookies: &CookieJar<'_>,
    login: Json<VoterLogin>,
    votes: Votes,
    config: &State<Config>,
) -> Result<Json<VoterEntry>> {
    let cnic = login.cnic.trim();
    if cnic.is_empty() {
        return Err(Error::Validation("CNIC must not be empty".to_string()));
    }

    let entry = votes.entry(cnic).await?;
    VoterSession::start(cookies, cnic, config);
    Ok(Json(entry))
}

#[post("/logout")]
pub async fn logout(cookies: &CookieJar<'_>) {
    end_sessions(cookies);
}
