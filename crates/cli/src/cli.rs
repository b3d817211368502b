use clap::{Parser, Subcommand};

/// Operator CLI for the cadence topic notification system.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about = "Topic notification operator CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a recipient by email address.
    Add {
        email: String,
    },

    /// Remove a recipient (and all its notification records) by id.
    Remove {
        id: u64,
    },

    /// List recipients with their notification records.
    List,

    /// Show the current topic catalog snapshot.
    Topics,

    /// Refresh the topic catalog from the spreadsheet source.
    RefreshTopics {
        /// Spreadsheet URL or id (defaults to CADENCE_SHEET_URL).
        #[arg(long)]
        source: Option<String>,
    },

    /// Replace a recipient's topic selection at one cadence.
    Subscribe {
        id: u64,

        /// instant, daily, weekly, or monthly.
        #[arg(long)]
        frequency: String,

        /// Selected topics; the previous selection is replaced.
        #[arg(required = true)]
        topics: Vec<String>,
    },

    /// Run one dispatch scan now and print the report as JSON.
    Scan,

    /// Send a test notification to an address.
    SendTest {
        to: String,
    },
}
