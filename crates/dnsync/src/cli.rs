//! Command-line arguments

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dnsync_core::model::RecordKey;
use dnsync_core::{ActivationRequest, RecordIdentity, RecordSelector, TagKind};

/// Keep remote DNS A records in sync with a declared desired state.
#[derive(Parser, Debug)]
#[command(name = "dnsync", version, about)]
pub struct Cli {
    /// Environment to operate on (selects credentials and document)
    #[arg(short, long, env = "DNSYNC_ENV", default_value = "test")]
    pub env: String,

    /// Directory holding `records.<env>.json`
    #[arg(long, env = "DNSYNC_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Directory for backups (defaults to the data directory)
    #[arg(long, env = "DNSYNC_BACKUP_DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Backups kept after each write (0 keeps all)
    #[arg(long, env = "DNSYNC_KEEP_BACKUPS", default_value_t = 10)]
    pub keep_backups: usize,

    /// Remote provider
    #[arg(long, env = "DNSYNC_PROVIDER", default_value = "cloudflare")]
    pub provider: String,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, env = "DNSYNC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show desired and remote records grouped by address
    View,

    /// Reconcile the remote against a JSON list of activation requests
    Apply {
        /// File containing a JSON array of `{name, address, alias, account, container, proxied, ttl}`
        file: PathBuf,
    },

    /// Create one record directly and remember it
    Create(CreateArgs),

    /// Set or clear a classification tag on one record
    Tag(TagArgs),

    /// Set the notes of every record at an address
    Notes {
        address: Ipv4Addr,
        notes: String,
    },

    /// Add a name to a tag vocabulary
    AddTag {
        /// account or container
        kind: TagKind,
        name: String,
    },

    /// Snapshot the current document
    Backup,

    /// List backups, newest first
    ListBackups,

    /// Delete backups beyond the newest `keep` (defaults to --keep-backups)
    Prune {
        keep: Option<usize>,
    },

    /// Replace the current document with a backup
    Restore {
        path: PathBuf,
    },

    /// Check that the remote list call succeeds
    Health,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Short (`us.xmr`) or fully-qualified name
    pub name: String,

    pub address: Ipv4Addr,

    /// Display alias, stored as the remote comment
    #[arg(long, default_value = "")]
    pub alias: String,

    #[arg(long)]
    pub account: Option<String>,

    #[arg(long)]
    pub container: Option<String>,

    #[arg(long)]
    pub proxied: bool,

    /// Seconds; 0 means the default of 60
    #[arg(long, default_value_t = 60)]
    pub ttl: u32,
}

impl CreateArgs {
    pub fn into_request(self) -> ActivationRequest {
        ActivationRequest {
            name: self.name,
            address: self.address,
            alias: self.alias,
            account: self.account,
            container: self.container,
            proxied: self.proxied,
            ttl: self.ttl,
        }
    }
}

#[derive(Args, Debug)]
pub struct TagArgs {
    /// account or container
    pub kind: TagKind,

    /// New value; empty clears the tag
    #[arg(default_value = "")]
    pub value: String,

    /// Record identity as shown by `view`
    #[arg(long)]
    pub identity: Option<String>,

    /// Record name, used with --address when the identity is unknown
    #[arg(long, requires = "address")]
    pub name: Option<String>,

    #[arg(long, requires = "name")]
    pub address: Option<Ipv4Addr>,
}

impl TagArgs {
    /// Identity first, `(name, address)` as the fallback
    pub fn selector(&self) -> anyhow::Result<RecordSelector> {
        let identity = self.identity.clone().map(RecordIdentity::from_token);
        let key = match (&self.name, self.address) {
            (Some(name), Some(address)) => Some(RecordKey::new(name.clone(), address)),
            _ => None,
        };

        if identity.is_none() && key.is_none() {
            anyhow::bail!("Specify --identity or both --name and --address");
        }
        Ok(RecordSelector { identity, key })
    }
}
