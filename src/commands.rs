//! This module defines the command-line interface for the application using
//! `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line
//! arguments, and a `Commands` enum that represents the available
//! subcommands and their options.

use clap::{Parser, Subcommand};

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// The 'search' subcommand: answer a query from the cache or the live
    /// web.
    #[clap(name = "search", alias = "s")]
    Search {
        /// The query to answer.
        query: String,

        /// Skip the cache lookup and force a fresh scrape. Results are
        /// still persisted afterwards.
        #[arg(long, short = 'f')]
        force: bool,

        /// Override the configured similarity threshold for this query.
        #[arg(long, short = 't')]
        threshold: Option<f32>,
    },

    /// The 'init' subcommand, which takes no arguments and is used for
    /// initialization.
    ///
    /// When invoked, this subcommand creates the configuration directory
    /// and writes a starter `config.yaml`.
    Init,
}
