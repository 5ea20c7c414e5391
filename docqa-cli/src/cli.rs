//! CLI command definitions using clap

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};

/// Ask questions about your PDF documents
#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path (defaults to ./config.yml when present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Question to answer, same as `docqa query <QUESTION>`
    pub question: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Answer a question from the ingested documents
    Query {
        /// The question to answer
        question: String,
    },

    /// Replace the collection with the text of the given files
    Ingest {
        /// PDF or plain-text files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

impl Cli {
    /// The command to run. A bare question is a `query`.
    pub fn resolve(&self) -> Result<Commands, clap::Error> {
        match (&self.question, &self.command) {
            (Some(question), None) => Ok(Commands::Query { question: question.clone() }),
            (None, Some(command)) => Ok(command.clone()),
            (Some(_), Some(_)) => Err(Cli::command().error(
                ErrorKind::ArgumentConflict,
                "a bare question cannot be combined with a subcommand",
            )),
            (None, None) => Err(Cli::command().error(
                ErrorKind::MissingRequiredArgument,
                "expected a question or a subcommand",
            )),
        }
    }
}
