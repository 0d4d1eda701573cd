//! # strata
//!
//! Command-line front end for the strata-core message history engine.
//!
//! - `cli` parses and executes commands against a redb history file
//! - `config` loads the application config (`strata.toml`)

pub mod cli;
pub mod config;
