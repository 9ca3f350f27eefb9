//! Shared services

mod database;

pub use database::DatabaseService;
