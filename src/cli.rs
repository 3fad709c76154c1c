//! Command line flags.

use std::path::PathBuf;

use clap::Parser;

use crate::loader;
use crate::relay::Registration;
use crate::{RelayError, Result};

/// Relay new RSS/Atom feed items into Discord channels.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Discord bot token
    #[arg(short = 't', long = "token")]
    pub token: Option<String>,

    /// CSV file listing feeds (url, channel, timer, user, pass)
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Feed URL when relaying a single feed
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// Channel ID when relaying a single feed
    #[arg(short = 'c', long = "channel")]
    pub channel: Option<String>,

    /// Poll interval in seconds for a single feed
    #[arg(long = "timer", default_value_t = 60)]
    pub timer: u64,

    /// Basic auth user for a single feed
    #[arg(long = "user", default_value = "")]
    pub user: String,

    /// Basic auth password for a single feed
    #[arg(long = "pass", default_value = "")]
    pub pass: String,

    /// Configuration file
    #[arg(long = "config", default_value = "config.toml")]
    pub config: PathBuf,

    /// Print messages to stdout instead of posting them
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

impl Cli {
    /// Check that the flags name some feeds.
    pub fn validate(&self) -> Result<()> {
        let single = self.url.is_some() && self.channel.is_some();
        if self.file.is_none() && !single {
            return Err(RelayError::Config(
                "provide a CSV file (-f) or both a feed URL (-u) and a channel (-c)".to_string(),
            ));
        }
        Ok(())
    }

    /// Registrations named by the flags: the CSV file when given, otherwise
    /// the single `-u`/`-c` feed.
    pub fn registrations(&self, block_private_hosts: bool) -> Result<Vec<Registration>> {
        self.validate()?;

        if let Some(path) = &self.file {
            return loader::load_csv(path, block_private_hosts);
        }

        let registration = loader::build_registration(
            self.url.as_deref().unwrap_or_default(),
            self.channel.as_deref().unwrap_or_default(),
            self.timer,
            &self.user,
            &self.pass,
            block_private_hosts,
        )?;
        Ok(vec![registration])
    }
}
