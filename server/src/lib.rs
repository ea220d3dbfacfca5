pub mod auth;
pub mod config;
pub mod db;
pub mod http;
pub mod services;
pub mod utils;
pub mod workflow;
