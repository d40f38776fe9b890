use clap::{Parser, Subcommand};
use std::path::PathBuf;

const LONG_ABOUT: &str = r#"
taskcal - calendar, tasks and chat in one small web app

Quick start:
  taskcal user create --username ana --password secret --calendar home
  taskcal serve --port 5000

Configuration is read from TASKCAL_* environment variables
(TASKCAL_DATA_DIR, TASKCAL_PORT, TASKCAL_LOCALE, ...). Flags given on the
command line take precedence.
"#;

#[derive(Parser, Clone)]
#[command(name = "taskcal")]
#[command(about = "Calendar and task web application with a real-time chat")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the web server
    Serve {
        /// Address to listen on
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long, short)]
        port: Option<u16>,

        /// Directory holding the database, chat log and logs
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Manage users
    #[command(subcommand)]
    User(UserCommands),
}

#[derive(Subcommand, Clone)]
pub enum UserCommands {
    /// Create a user and their default calendar
    ///
    /// Examples:
    ///   taskcal user create --username ana --password secret
    ///   taskcal user create --username bo --password secret --calendar family --admin
    Create {
        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,

        /// Default calendar id, created when missing
        #[arg(long, default_value = "default")]
        calendar: String,

        /// Grant admin rights
        #[arg(long)]
        admin: bool,
    },

    /// List users
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
