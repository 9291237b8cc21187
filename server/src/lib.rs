pub mod config;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod routes;
pub mod store;
pub mod utils;
