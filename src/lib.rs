pub mod approval;
pub mod assignment;
pub mod config;
pub mod error;
pub mod event;
pub mod notify;
pub mod registry;
pub mod service;
mod store;
pub mod utils;
