//! CLI for the pagemirror asset-cloning service.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pagemirror_core::control::{ContextId, Request};
use std::path::PathBuf;

use commands::{run_send, run_serve, run_watch};

/// Top-level CLI for the pagemirror asset cloner.
#[derive(Debug, Parser)]
#[command(name = "pagemirror")]
#[command(about = "pagemirror: clone a page's observed assets to disk", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the mirroring service and its control socket in the foreground.
    Serve {
        /// Override the configured destination root for this run.
        #[arg(long, value_name = "DIR")]
        destination_root: Option<PathBuf>,
    },

    /// Start recording requests observed for a browsing context.
    Detect {
        /// Browsing-context (tab) identifier.
        context_id: ContextId,
    },

    /// Stop the active detection session.
    StopDetect,

    /// List the URLs recorded for the active context.
    Urls,

    /// Clear all recorded URLs.
    Clear,

    /// Show detection and download state.
    State,

    /// Download all recorded URLs for the active context.
    Download,

    /// Stop the running batch. In-flight transfers still settle.
    StopDownload,

    /// Download a single URL immediately.
    Fetch {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
    },

    /// Report one observed request (observer feed).
    Observed {
        /// Browsing-context (tab) identifier.
        context_id: ContextId,
        /// URL of the completed network fetch.
        url: String,
    },

    /// Report a closed browsing context; its recorded URLs are dropped.
    Closed {
        /// Browsing-context (tab) identifier.
        context_id: ContextId,
    },

    /// Stream service events (progress, notifications) to stdout.
    Watch,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Serve { destination_root } => run_serve(destination_root).await?,
            CliCommand::Detect { context_id } => {
                run_send(Request::StartDetecting { context_id }).await?
            }
            CliCommand::StopDetect => run_send(Request::StopDetecting).await?,
            CliCommand::Urls => run_send(Request::GetRequests).await?,
            CliCommand::Clear => run_send(Request::ClearRequests).await?,
            CliCommand::State => run_send(Request::GetState).await?,
            CliCommand::Download => run_send(Request::StartDownload).await?,
            CliCommand::StopDownload => run_send(Request::StopDownload).await?,
            CliCommand::Fetch { url } => run_send(Request::ManualDownload { url }).await?,
            CliCommand::Observed { context_id, url } => {
                run_send(Request::Observed { context_id, url }).await?
            }
            CliCommand::Closed { context_id } => {
                run_send(Request::ContextClosed { context_id }).await?
            }
            CliCommand::Watch => run_watch().await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
