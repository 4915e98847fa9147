// # dnsync - DNS record sync CLI
//
// This binary is a THIN integration layer. All reconciliation, storage and
// remote logic lives in dnsync-core and the provider crates.
//
// The binary is responsible for:
// 1. Parsing flags (each also readable from the environment)
// 2. Initializing tracing
// 3. Resolving credentials and registering providers
// 4. Running one command against one environment
//
// ## Configuration
//
// ### Credentials (per environment, unprefixed as fallback)
// - `DNSYNC_<ENV>_CF_API_TOKEN` / `CF_API_TOKEN`: API token
// - `DNSYNC_<ENV>_CF_ZONE_ID` / `CF_ZONE_ID`: Zone ID
// - `DNSYNC_<ENV>_DNS_NAME` / `DNS_NAME`: Domain suffix
//
// ### Storage
// - `DNSYNC_ENV`: Environment name (default `test`)
// - `DNSYNC_DATA_DIR`: Directory holding `records.<env>.json`
// - `DNSYNC_BACKUP_DIR`: Backup directory (default: data directory)
// - `DNSYNC_KEEP_BACKUPS`: Backups kept after each write (default 10)
//
// ### Logging
// - `RUST_LOG` or `DNSYNC_LOG_LEVEL` (default `info`)
//
// ## Example
//
// ```bash
// export CF_API_TOKEN=your_token
// export CF_ZONE_ID=your_zone
// export DNS_NAME=example.com
//
// dnsync --env production view
// dnsync --env production apply desired.json
// ```

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dnsync_core::{
    ActivationRequest, ClientConfig, CredentialSource, DetailStatus, EnvCredentialSource,
    FileSnapshotStore, ProviderRegistry, Reconciler, ReconcilerConfig, RunResult, StoreConfig,
    SyncEvent, UnifiedView,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

/// Exit codes
///
/// - 0: Command succeeded
/// - 1: Configuration or startup error
/// - 2: Runtime error (remote, storage, or partial reconciliation failure)
#[derive(Debug, Clone, Copy)]
enum DnsyncExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DnsyncExitCode> for ExitCode {
    fn from(code: DnsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
    {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Invalid log level '{}': {}", cli.log_level, e);
            return DnsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DnsyncExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let app = match App::build(&cli) {
            Ok(app) => app,
            Err(e) => {
                error!("Configuration error: {:#}", e);
                return DnsyncExitCode::ConfigError;
            }
        };

        let code = match app.dispatch(cli.command, cli.json).await {
            Ok(true) => DnsyncExitCode::Success,
            Ok(false) => DnsyncExitCode::RuntimeError,
            Err(e) => {
                error!("{:#}", e);
                DnsyncExitCode::RuntimeError
            }
        };

        app.finish().await;
        code
    })
    .into()
}

/// A reconciler wired to one environment, plus its event printer
struct App {
    reconciler: Reconciler,
    environment: String,
    keep_backups: usize,
    events: JoinHandle<()>,
}

impl App {
    fn build(cli: &Cli) -> Result<Self> {
        let credentials = EnvCredentialSource.resolve(&cli.env)?;

        let registry = ProviderRegistry::new();
        #[cfg(feature = "cloudflare")]
        dnsync_provider_cloudflare::register(&registry);

        let remote = registry
            .create_remote(&cli.provider, &credentials, &ClientConfig::default())
            .with_context(|| format!("Failed to create '{}' client", cli.provider))?;

        let mut store_config =
            StoreConfig::new(&cli.data_dir).with_keep_backups(cli.keep_backups);
        if let Some(dir) = &cli.backup_dir {
            store_config = store_config.with_backup_dir(dir);
        }
        info!(
            environment = %cli.env,
            data_dir = %cli.data_dir.display(),
            keep_backups = cli.keep_backups,
            "Using document store"
        );

        let store = Arc::new(FileSnapshotStore::new(store_config));
        let (reconciler, events) = Reconciler::new(store, ReconcilerConfig::default())?;
        reconciler.register_environment(cli.env.clone(), Arc::from(remote));

        Ok(Self {
            reconciler,
            environment: cli.env.clone(),
            keep_backups: cli.keep_backups,
            events: tokio::spawn(print_events(events)),
        })
    }

    /// Run one command; `Ok(false)` means it completed with failures
    async fn dispatch(&self, command: Command, as_json: bool) -> Result<bool> {
        let env = self.environment.as_str();
        let reconciler = &self.reconciler;

        match command {
            Command::View => {
                let view = reconciler.view(env).await?;
                if as_json {
                    println!("{}", serde_json::to_string_pretty(&view)?);
                } else {
                    print_view(&view);
                }
            }
            Command::Apply { file } => {
                let raw = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let desired: Vec<ActivationRequest> = serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid activation list in {}", file.display()))?;

                let result = reconciler.reconcile(env, desired).await?;
                if as_json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    print_run(&result);
                }
                return Ok(result.success);
            }
            Command::Create(args) => {
                let identity = reconciler
                    .create_single_entry(env, args.into_request())
                    .await?;
                if as_json {
                    println!("{}", json!({ "identity": identity }));
                } else {
                    println!("Created record {identity}");
                }
            }
            Command::Tag(args) => {
                let selector = args.selector()?;
                reconciler
                    .update_tag(env, selector, args.kind, &args.value)
                    .await?;
                if args.value.is_empty() {
                    println!("Cleared {} tag", args.kind);
                } else {
                    println!("Set {} tag to {}", args.kind, args.value);
                }
            }
            Command::Notes { address, notes } => {
                let updated = reconciler.update_notes(env, address, &notes).await?;
                println!("Updated notes on {updated} record(s) at {address}");
            }
            Command::AddTag { kind, name } => {
                if reconciler.add_vocabulary_tag(env, kind, &name).await? {
                    println!("Added {kind} tag {}", name.trim());
                } else {
                    println!("{kind} tag {} already exists", name.trim());
                }
            }
            Command::Backup => {
                let path = reconciler.backup(env).await?;
                println!("Backup created: {}", path.display());
            }
            Command::ListBackups => {
                let backups = reconciler.list_backups(env).await?;
                if as_json {
                    println!("{}", serde_json::to_string_pretty(&backups)?);
                } else if backups.is_empty() {
                    println!("No backups found");
                } else {
                    for (i, backup) in backups.iter().enumerate() {
                        let marker = if self.keep_backups == 0 || i < self.keep_backups {
                            "KEPT"
                        } else {
                            "TO BE REMOVED"
                        };
                        println!(
                            "{}  {:>8} bytes  {}  [{}]",
                            backup.modified.format("%Y-%m-%d %H:%M:%S"),
                            backup.size,
                            backup.path.display(),
                            marker
                        );
                    }
                }
            }
            Command::Prune { keep } => {
                let keep = keep.unwrap_or(self.keep_backups);
                let removed = reconciler.prune_backups(env, keep).await?;
                if as_json {
                    println!("{}", serde_json::to_string_pretty(&removed)?);
                } else if removed.is_empty() {
                    println!("Nothing to prune");
                } else {
                    for path in &removed {
                        println!("Removed {}", path.display());
                    }
                }
            }
            Command::Restore { path } => {
                let restored = reconciler.restore(env, &path).await?;
                println!("Restored {} from {}", restored.display(), path.display());
            }
            Command::Health => {
                let status = reconciler.health(env).await?;
                if as_json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else if status.remote_connected {
                    println!(
                        "{} ({}): connected, {} record(s)",
                        status.domain,
                        status.provider,
                        status.records.unwrap_or_default()
                    );
                } else {
                    println!(
                        "{} ({}): unreachable: {}",
                        status.domain,
                        status.provider,
                        status.error.as_deref().unwrap_or("unknown error")
                    );
                }
                return Ok(status.remote_connected);
            }
        }

        Ok(true)
    }

    /// Close the event channel and wait for the printer to drain it
    async fn finish(self) {
        let Self {
            reconciler, events, ..
        } = self;
        drop(reconciler);
        if let Err(e) = events.await {
            debug!("Event printer ended abnormally: {}", e);
        }
    }
}

/// Forward reconciler events to the log at their own level
async fn print_events(mut events: mpsc::Receiver<SyncEvent>) {
    while let Some(event) = events.recv().await {
        let environment = event.environment().to_string();
        let message = event.message();
        let level = event.level();
        if level == Level::ERROR {
            error!(target: "dnsync::events", environment, "{}", message);
        } else if level == Level::WARN {
            warn!(target: "dnsync::events", environment, "{}", message);
        } else if level == Level::INFO {
            info!(target: "dnsync::events", environment, "{}", message);
        } else {
            debug!(target: "dnsync::events", environment, "{}", message);
        }
    }
}

fn print_view(view: &UnifiedView) {
    println!(
        "{} ({}): {} servers, {} active, {} inactive",
        view.environment, view.domain, view.total_servers, view.active_count, view.inactive_count
    );

    for group in &view.groups {
        println!();
        println!("{}  {}", group.address, group.names);
        if !group.notes.is_empty() {
            println!("  notes: {}", group.notes);
        }
        for entry in &group.entries {
            let status = if entry.active { "ACTIVE  " } else { "inactive" };
            let tags: Vec<&str> = [entry.account.as_deref(), entry.container.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            println!(
                "  [{status}] {:<24} {:<20} {:<16} {}",
                entry.name,
                entry.alias,
                tags.join(","),
                entry.identity
            );
        }
    }

    println!();
    println!("Account tags:   {}", view.account_tags.join(", "));
    println!("Container tags: {}", view.container_tags.join(", "));
}

fn print_run(result: &RunResult) {
    for detail in &result.details {
        let prefix = match detail.status {
            DetailStatus::Success => "ok",
            DetailStatus::Warning => "warn",
            DetailStatus::Error => "error",
        };
        println!("[{prefix}] {}", detail.message);
    }
    println!("{}", result.message);
}
