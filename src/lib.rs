pub mod app;
pub mod clock;
pub mod config;
pub mod domain;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod output;
pub mod store;
pub mod throttle;
pub mod url_builder;
