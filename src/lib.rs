//! Admin node bootstrap for a Crowbar-managed cloud.
//!
//! The install run checks the host, validates package repositories, brings
//! up backend services, installs barclamps in order, negotiates the crowbar
//! proposal, and walks the admin node through its lifecycle states.
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod gate;
pub mod identity;
pub mod logging;
pub mod node;
pub mod paths;
pub mod preflight;
pub mod progress;
pub mod proposal;
pub mod repos;
pub mod retry;
pub mod services;
pub mod store;
pub mod transition;
pub mod units;
pub mod verify;
pub mod workflow;

#[doc(hidden)]
pub mod testing;
