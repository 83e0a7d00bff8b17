// ABOUTME: Library crate for termsync exposing the session, sync and routing core

#![allow(missing_docs)]

pub mod cli;
pub mod config;
pub mod git;
pub mod models;
pub mod multiplexer;
pub mod registry;
pub mod router;
pub mod runner;
pub mod sync;
pub mod terminal;
