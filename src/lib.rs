pub mod api;
pub mod api_docs;
pub mod broker;
pub mod config;
pub mod db;
pub mod domain;
pub mod infrastructure;
pub mod models;
pub mod pipeline;
pub mod relay;
pub mod server;
