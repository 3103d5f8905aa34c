use log::{info, warn};

use crate::{
    error::{Error, Result},
    model::store::{Db, Filter, Query, Table},
};

use super::admin_core::{Admin, AdminCredentials};

/// Check an admin's credentials against the stored password hash.
///
/// An unknown username is [`Error::NotFound`] and a wrong password is
/// [`Error::Conflict`]; callers facing the outside world should not tell the
/// two apart.
pub async fn verify_admin(db: &Db, username: &str, password: &str) -> Result<Admin> {
    let admin: Admin = db
        .first_row(Table::Admins, Query::new(Filter::by("username", username)))
        .await?
        .ok_or_else(|| Error::not_found(format!("Admin {username}")))?;

    if admin.verify_password(password) {
        Ok(admin)
    } else {
        Err(Error::Conflict(format!(
            "Password mismatch for admin {username}"
        )))
    }
}

/// Store a new admin.
pub async fn create_admin(db: &Db, credentials: AdminCredentials) -> Result<Admin> {
    let admin = Admin::try_from(credentials)?;
    db.insert_rows(Table::Admins, &[&admin]).await?;
    info!("Created admin {}", admin.username);
    Ok(admin)
}

/// Make sure someone can log in: if there are no admins yet, create one from
/// the bootstrap credentials.
///
/// This operation is idempotent.
pub async fn ensure_admin_exists(db: &Db, bootstrap: Option<AdminCredentials>) -> Result<()> {
    let existing: Option<Admin> = db
        .first_row(Table::Admins, Query::new(Filter::all()))
        .await?;
    match (existing, bootstrap) {
        (Some(_), _) => Ok(()),
        (None, Some(credentials)) => create_admin(db, credentials).await.map(|_| ()),
        (None, None) => {
            warn!("No admin exists and no `bootstrap_admin` is configured; nobody can log in");
            Ok(())
        }
    }
}
