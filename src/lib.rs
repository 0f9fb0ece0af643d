pub mod archive;
pub mod assets;
pub mod auth;
pub mod booking;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod reports;
pub mod routes;
pub mod state;
pub mod users;
