use chrono::Duration;
use log::{error, info, warn};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    admin::{ensure_admin_exists, AdminCredentials},
    store::{Db, MemoryStore, MongoStore},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_session_ttl")]
    session_ttl: u32,
}

fn default_session_ttl() -> u32 {
    3600
}

impl Config {
    /// Valid lifetime of login session cookies.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_ttl: default_session_ttl(),
        }
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        Ok(rocket.manage(config))
    }
}

/// Which [`Store`](crate::model::store::Store) implementation to run against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Mongodb,
    Memory,
}

/// Configuration for the data store.
#[derive(Deserialize)]
struct StoreConfig {
    // non-secrets
    store: Backend,
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: Option<String>,
    bootstrap_admin: Option<AdminCredentials>,
}

fn default_db_name() -> String {
    "elections".to_string()
}

/// A fairing that loads the store config, connects to the store, performs
/// any setup necessary, and places a [`Db`] into managed state.
pub struct StoreFairing;

impl StoreFairing {
    async fn connect(config: &StoreConfig) -> Result<Db, String> {
        match config.store {
            Backend::Memory => {
                warn!("Using the in-memory store; nothing will survive a restart");
                Ok(Db::new(MemoryStore::new()))
            }
            Backend::Mongodb => {
                let uri = config
                    .db_uri
                    .as_deref()
                    .ok_or_else(|| "`db_uri` must be set for the mongodb store".to_string())?;
                let client = MongoClient::with_uri_str(uri)
                    .await
                    .map_err(|e| format!("Failed to connect to database: {e}"))?;
                let store = MongoStore::new(client.database(&config.db_name));
                store
                    .ensure_indexes_exist()
                    .await
                    .map_err(|e| format!("Failed to create indexes: {e}"))?;
                Ok(Db::new(store))
            }
        }
    }
}

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded {:?} store config, connecting...", config.store);

        let db = match Self::connect(&config).await {
            Ok(db) => db,
            Err(e) => {
                error!("{e}");
                return Err(rocket);
            }
        };

        // Ensure there is at least one admin who can log in.
        if let Err(e) = ensure_admin_exists(&db, config.bootstrap_admin).await {
            error!("Failed to provision the bootstrap admin: {e}");
            return Err(rocket);
        }
        info!("...store online!");

        Ok(rocket.manage(db))
    }
}
