pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod markdown;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
