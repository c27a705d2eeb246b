pub mod agents;
pub mod ask;
pub mod auth;
pub mod config;
pub mod documents;
pub mod messages;
pub mod sections;
pub mod server;
pub mod web;
pub mod youtube;
