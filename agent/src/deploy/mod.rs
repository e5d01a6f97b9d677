//! Deployment module

pub mod executor;
pub mod fsm;
pub mod git;
pub mod services;
pub mod watcher;
