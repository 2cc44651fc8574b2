//! Groundwork - GitOps bootstrap
//!
//! Creates (or reuses) a management repository on a git hosting backend, commits
//! the reconciliation agent, cert-manager and the platform controllers into it,
//! and waits until the cluster has reconciled each of them.
//!
//! The entry point is [`bootstrap::Bootstrap`]; the `cli` and `commands`
//! modules only turn flags and the configuration file into
//! [`config::BootstrapOptions`].

pub mod agent;
pub mod bootstrap;
pub mod certs;
pub mod cli;
pub mod cluster;
pub mod commands;
pub mod config;
pub mod converge;
pub mod deadline;
pub mod defaults;
pub mod error;
pub mod extract;
pub mod git;
pub mod localize;
pub mod manifest;
pub mod progress;
pub mod provider;
pub mod publish;
pub mod registry;
pub mod resolver;
pub mod temp;

#[cfg(test)]
mod testing;

pub use error::{GroundworkError, Result};
