//! Server Angel Library
//!
//! Core modules for the Server Angel automation agent.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod exec;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod notify;
pub mod storage;
pub mod telemetry;
pub mod utils;
