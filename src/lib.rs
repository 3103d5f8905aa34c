#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::{
    config::{ConfigFairing, StoreFairing},
    logging::LoggerFairing,
};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub use config::Config;
pub use model::store::Db;

/// Build the server: load config, connect to the configured store, and
/// mount every route.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .attach(LoggerFairing)
        .mount("/", api::routes())
}

/// Build the server around an existing store, with default config.
pub fn rocket_for_store(db: Db) -> Rocket<Build> {
    rocket::build()
        .manage(Config::default())
        .manage(db)
        .attach(LoggerFairing)
        .mount("/", api::routes())
}
