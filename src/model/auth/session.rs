use std::marker::PhantomData;

use chrono::{DateTime, TimeZone, Utc};
use rocket::{
    http::{Cookie, CookieJar, SameSite, Status},
    request::{self, FromRequest},
    time, Request,
};

use crate::config::Config;

/// A kind of logged-in user.
pub trait Role: Send + Sync + 'static {
    /// Name of the private cookie holding the session.
    const COOKIE: &'static str;
}

/// An administrator, identified by username.
pub struct AdminRole;

impl Role for AdminRole {
    const COOKIE: &'static str = "admin_session";
}

/// A voter, identified by CNIC.
pub struct VoterRole;

impl Role for VoterRole {
    const COOKIE: &'static str = "voter_session";
}

/// A logged-in user of a particular role.
///
/// Sessions live in private (encrypted and authenticated) cookies, so the
/// subject and expiry cannot be forged or read by the client.
pub struct Session<R> {
    subject: String,
    expire_at: DateTime<Utc>,
    phantom: PhantomData<R>,
}

pub type AdminSession = Session<AdminRole>;
pub type VoterSession = Session<VoterRole>;

impl<R: Role> Session<R> {
    /// Start a session for `subject`, storing it in the cookie jar.
    pub fn start(cookies: &CookieJar<'_>, subject: impl Into<String>, config: &Config) -> Self {
        let session = Self {
            subject: subject.into(),
            expire_at: Utc::now() + config.session_ttl(),
            phantom: PhantomData,
        };
        cookies.add_private(session.to_cookie(config));
        session
    }

    /// Who is logged in: a username for admins, a CNIC for voters.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    fn to_cookie(&self, config: &Config) -> Cookie<'static> {
        let value = format!("{}|{}", self.expire_at.timestamp(), self.subject);
        Cookie::build((R::COOKIE, value))
            .max_age(time::Duration::seconds(config.session_ttl().num_seconds()))
            .same_site(SameSite::Strict)
            .http_only(true)
            .build()
    }

    /// The live session in the cookie jar, if there is one.
    pub fn from_jar(cookies: &CookieJar<'_>) -> Option<Self> {
        cookies
            .get_private(R::COOKIE)
            .and_then(|cookie| Self::from_cookie(&cookie, Utc::now()))
    }

    /// Decode a session cookie, rejecting it if it has expired.
    fn from_cookie(cookie: &Cookie<'_>, now: DateTime<Utc>) -> Option<Self> {
        let (expiry, subject) = cookie.value().split_once('|')?;
        let expire_at = Utc.timestamp_opt(expiry.parse().ok()?, 0).single()?;
        if expire_at <= now || subject.is_empty() {
            return None;
        }
        Some(Self {
            subject: subject.to_string(),
            expire_at,
            phantom: PhantomData,
        })
    }
}

/// Log out of every role.
pub fn end_sessions(cookies: &CookieJar<'_>) {
    cookies.remove_private(AdminRole::COOKIE);
    cookies.remove_private(VoterRole::COOKIE);
}

#[derive(Debug)]
pub enum SessionError {
    Expired,
}

#[rocket::async_trait]
impl<'r, R: Role> FromRequest<'r> for Session<R> {
    type Error = SessionError;

    /// Get the session from its private cookie. No cookie forwards; a stale
    /// or malformed one fails with `401 Unauthorized`.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let cookie = match req.cookies().get_private(R::COOKIE) {
            Some(cookie) => cookie,
            None => return request::Outcome::Forward(Status::Unauthorized),
        };
        match Self::from_cookie(&cookie, Utc::now()) {
            Some(session) => request::Outcome::Success(session),
            None => request::Outcome::Error((Status::Unauthorized, SessionError::Expired)),
        }
    }
}
