//! Configuration for Lectern
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

/// Lectern - progress tracking and certificate issuance backend
#[derive(Parser, Debug, Clone)]
#[command(name = "lectern")]
#[command(about = "Progress tracking and certificate issuance for video course platforms")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "lectern")]
    pub mongodb_db: String,

    /// Base URL of the blob store certificate artifacts are uploaded to
    /// (e.g., "https://blobs.example.com/lectern")
    /// When unset, issuance still succeeds but artifacts stay pending.
    #[arg(long, env = "STORAGE_URL")]
    pub storage_url: Option<String>,

    /// Webhook endpoint for outbound notifications (certificate issued/revoked)
    /// When unset, notifications are skipped.
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    pub notify_webhook_url: Option<String>,

    /// Sender name used in outbound notifications
    #[arg(long, env = "NOTIFY_SENDER", default_value = "Lectern")]
    pub notify_sender: String,

    /// Enable development mode (verbose error bodies)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum watch-history entries kept per video record (oldest evicted)
    #[arg(long, env = "WATCH_HISTORY_CAP", default_value = "50")]
    pub watch_history_cap: usize,

    /// Minimum percentage-point change before a watch-history entry is appended
    #[arg(long, env = "WATCH_HISTORY_MATERIALITY", default_value = "5")]
    pub watch_history_materiality: i32,
}

impl Args {
    /// Validate configuration values that clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.watch_history_cap == 0 {
            return Err("WATCH_HISTORY_CAP must be at least 1".to_string());
        }
        if !(0..=100).contains(&self.watch_history_materiality) {
            return Err("WATCH_HISTORY_MATERIALITY must be between 0 and 100".to_string());
        }
        if let Some(url) = &self.storage_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("STORAGE_URL must be an http(s) URL, got '{url}'"));
            }
        }
        Ok(())
    }
}
