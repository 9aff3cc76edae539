pub mod app;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod lookup;
pub mod models;
pub mod pipeline;
pub mod prefs;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;
