use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub const DATABASE_DSN_ENV: &str = "SNIP_DATABASE_DSN";
pub const FILE_STORAGE_PATH_ENV: &str = "SNIP_FILE_STORAGE_PATH";
pub const BASE_URL_ENV: &str = "SNIP_BASE_URL";
pub const DELETE_QUEUE_CAPACITY_ENV: &str = "SNIP_DELETE_QUEUE_CAPACITY";
pub const LOG_FORMAT_ENV: &str = "SNIP_LOG_FORMAT";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_DELETE_QUEUE_CAPACITY: &str = "1024";
pub const DEFAULT_PING_TIMEOUT_MS: &str = "1000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Operate a snip URL store")]
pub struct CLI {
    /// PostgreSQL connection string; takes precedence over the file path.
    #[arg(long, short = 'd', env = DATABASE_DSN_ENV, global = true)]
    pub database_dsn: Option<String>,

    /// Append-only log used when no database is configured.
    #[arg(long, short = 'f', env = FILE_STORAGE_PATH_ENV, global = true)]
    pub file_storage_path: Option<PathBuf>,

    #[arg(long, short = 'b', env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    #[arg(
        long,
        env = DELETE_QUEUE_CAPACITY_ENV,
        default_value = DEFAULT_DELETE_QUEUE_CAPACITY,
        value_parser = clap::value_parser!(u32).range(1..),
        global = true
    )]
    pub delete_queue_capacity: u32,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one or more URLs; several URLs are saved as one batch.
    Shorten {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long, short = 'u')]
        user: Option<String>,
    },
    /// Resolve a key.
    Get { key: String },
    /// List the live URLs of a user.
    List {
        #[arg(long, short = 'u')]
        user: String,
    },
    /// Soft-delete keys owned by a user; without --user any owner matches.
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long, short = 'u')]
        user: Option<String>,
    },
    /// Count live URLs and owners.
    Stats,
    /// Check the storage connection.
    Ping {
        #[arg(long, default_value = DEFAULT_PING_TIMEOUT_MS)]
        timeout_ms: u64,
    },
}
