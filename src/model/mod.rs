//! Domain types and the components that operate on them.
//!
//! - [`store`]: the data access layer every other module goes through.
//! - [`election`]: elections, candidates, and the lifecycle manager.
//! - [`vote`]: votes, receipts, and the vote store.
//! - [`admin`]: admin accounts and the credential check.
//! - [`auth`]: login sessions for admins and voters.

pub mod admin;
pub mod auth;
pub mod election;
pub mod store;
pub mod vote;
