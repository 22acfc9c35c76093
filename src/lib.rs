// Library for tests to access modules

pub mod bundles;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod quadlet;
pub mod routes;
pub mod twin;
