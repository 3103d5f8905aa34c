use std::{
    fmt::{Display, Formatter},
    sync::atomic::{AtomicUsize, Ordering},
    time::Instant,
};

use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::{CookieJar, StatusClass},
    Data, Orbit, Request, Response, Rocket,
};

use crate::model::auth::{AdminSession, VoterSession};

/// A CNIC as it may appear in logs: every character but the last two hidden.
pub struct Masked<'a>(pub &'a str);

impl Display for Masked<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let shown = self.0.chars().count().saturating_sub(2);
        for (i, c) in self.0.chars().enumerate() {
            if i < shown {
                f.write_str("*")?;
            } else {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// Who sent a request, as far as their session cookie says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Admin(String),
    Voter(String),
    Anonymous,
}

impl Caller {
    /// Identify the caller from the session cookies. A stale session counts
    /// as anonymous; an admin session wins over a voter one.
    pub fn from_cookies(cookies: &CookieJar<'_>) -> Self {
        if let Some(session) = AdminSession::from_jar(cookies) {
            Self::Admin(session.subject().to_string())
        } else if let Some(session) = VoterSession::from_jar(cookies) {
            Self::Voter(session.subject().to_string())
        } else {
            Self::Anonymous
        }
    }
}

impl Display for Caller {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin(username) => write!(f, "admin:{username}"),
            Self::Voter(cnic) => write!(f, "voter:{}", Masked(cnic)),
            Self::Anonymous => f.write_str("anonymous"),
        }
    }
}

/// Per-request bookkeeping: a sequence number pairing request and response
/// lines, and the arrival time.
struct Arrival {
    seq: usize,
    at: Instant,
}

impl Arrival {
    fn now() -> Self {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        Self {
            seq: SEQ.fetch_add(1, Ordering::Relaxed),
            at: Instant::now(),
        }
    }
}

/// Logs launch and shutdown, and every request with its caller, outcome,
/// and latency.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let protocol = if config.tls_enabled() { "https" } else { "http" };
        info!(
            "Election server listening on {protocol}://{}:{}",
            config.address, config.port
        );
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let arrival = req.local_cache(Arrival::now);
        let caller = Caller::from_cookies(req.cookies());
        info!("->req{} {} {} from {caller}", arrival.seq, req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let arrival = req.local_cache(Arrival::now);
        let route = req
            .route()
            .and_then(|route| route.name.as_deref())
            .unwrap_or("unmatched");
        let log_msg = format!(
            "<-rsp{} {} {route} in {}ms",
            arrival.seq,
            res.status(),
            arrival.at.elapsed().as_millis()
        );
        match res.status().class() {
            StatusClass::ServerError => error!("{log_msg}"),
            StatusClass::ClientError => warn!("{log_msg}"),
            _ => info!("{log_msg}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutdown requested; no further ballots will be accepted");
    }
}
