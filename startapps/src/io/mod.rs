//! I/O and collaborator boundaries for the app driver.

pub mod config;
pub mod output;
pub mod render;
pub mod source;
pub mod store;
pub mod validator;
