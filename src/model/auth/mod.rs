mod session;

pub use session::{
    end_sessions, AdminRole, AdminSession, Role, Session, SessionError, VoterRole, VoterSession,
};
