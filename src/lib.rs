pub mod app;
pub mod auth;
pub mod classify;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod project;
pub mod registration;
pub mod scan;
