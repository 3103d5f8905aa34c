mod admin_core;
mod db;

pub use admin_core::{Admin, AdminCredentials, MIN_PASSWORD_LENGTH};
pub use db::{create_admin, ensure_admin_exists, verify_admin};
