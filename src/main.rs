//! Command-line front end for dns-changer.

use std::io::Read;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dns_changer::{
    ChangerConfig, ChangerError, DnsChanger, PromoDocument, Provider, TerminalPrompt,
};
use tracing_subscriber::EnvFilter;

/// Switch the systemd-resolved DNS provider.
#[derive(Parser, Debug)]
#[command(name = "dns-changer", version, about)]
struct Cli {
    /// Per-user state directory (default: ~/.config/dns-changer).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Directory holding bundled provider defaults.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// System resolver configuration file.
    #[arg(long, global = true)]
    resolved_conf: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show the active provider, connectivity and latency.
    Status {
        /// Skip the lookup probe.
        #[arg(long)]
        offline: bool,
    },
    /// List every known provider.
    List,
    /// Switch to a provider.
    Connect {
        /// Provider name (case-sensitive).
        name: String,
    },
    /// Add a custom provider.
    Add {
        /// Display name.
        name: String,
        /// Primary address; also used to recognise the provider.
        primary: String,
        /// Secondary address.
        #[arg(long)]
        secondary: Option<String>,
        /// IPv6 address.
        #[arg(long)]
        ipv6: Option<String>,
        /// Write `DNSOverTLS=no`.
        #[arg(long)]
        no_tls: bool,
    },
    /// Remove a custom provider.
    Remove {
        /// Provider name.
        name: String,
    },
    /// Restart the resolver without rewriting its configuration.
    Restart,
    /// Manage the NextDNS block.
    #[command(subcommand)]
    Promo(PromoCmd),
    /// Manage resolver configuration backups.
    #[command(subcommand)]
    Backup(BackupCmd),
}

#[derive(Subcommand, Debug)]
enum PromoCmd {
    /// Print the stored block.
    Show,
    /// Store a block read from a file, or from stdin when omitted.
    Set {
        /// File holding the block.
        file: Option<PathBuf>,
    },
    /// Apply the stored block.
    Connect,
}

#[derive(Subcommand, Debug)]
enum BackupCmd {
    /// Snapshot the current configuration.
    Create,
    /// List backups, latest first.
    List,
    /// Restore a backup by file name.
    Restore {
        /// Backup file name.
        name: String,
    },
    /// Restore the latest backup.
    RestoreLatest,
    /// Delete one backup.
    Delete {
        /// Backup file name.
        name: String,
    },
    /// Delete every backup.
    Clean,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ChangerConfig::new();
    if let Some(dir) = &cli.config_dir {
        config = config.with_config_dir(dir);
    }
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    if let Some(path) = &cli.resolved_conf {
        config = config.with_resolved_conf(path);
    }

    let mut dns = DnsChanger::open(config, Box::new(TerminalPrompt::new("[dns-changer] sudo password: ")))
        .context("failed to open dns-changer state")?;

    match dns.ensure_initial_backup() {
        Ok(true) => tracing::info!("Initial backup created"),
        Ok(false) => {}
        Err(e) => tracing::warn!(
            error = %backup_error(&e, &dns.config().resolved_conf),
            "Could not create initial backup"
        ),
    }

    run(&mut dns, cli.command)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(dns: &mut DnsChanger, command: Cmd) -> anyhow::Result<()> {
    match command {
        Cmd::Status { offline } => {
            let status = dns.status(offline);
            println!("Provider:  {}", status.active);
            println!("Address:   {}", status.address.as_deref().unwrap_or("N/A"));
            println!(
                "Status:    {}",
                if status.connected { "CONNECTED" } else { "DISCONNECTED" }
            );
            println!("Ping:      {}", status.latency);
        }
        Cmd::List => {
            let active = dns.current_provider();
            for p in dns.providers() {
                let marker = if p.name == active.name() { "*" } else { " " };
                let kind = if p.custom { "custom" } else { "built-in" };
                println!("{marker} {:<24} {:<16} {kind}", p.name, p.ip);
            }
        }
        Cmd::Connect { name } => {
            dns.connect(&name)?;
            println!("Switched to {name}.");
        }
        Cmd::Add {
            name,
            primary,
            secondary,
            ipv6,
            no_tls,
        } => {
            if !valid_name(&name) {
                bail!("invalid name: use 1-40 letters, digits, spaces, '_' or '-'");
            }
            for addr in [Some(&primary), secondary.as_ref(), ipv6.as_ref()]
                .into_iter()
                .flatten()
            {
                if !valid_address(addr) {
                    bail!("invalid address: {addr}");
                }
            }
            let block = Provider::resolve_block(
                &[
                    primary.as_str(),
                    secondary.as_deref().unwrap_or_default(),
                    ipv6.as_deref().unwrap_or_default(),
                ],
                !no_tls,
            );
            dns.add_provider(&name, &block, &primary)?;
            println!("Custom DNS added.");
        }
        Cmd::Remove { name } => {
            if dns.remove_provider(&name)? {
                println!("Custom DNS removed.");
            } else {
                println!("No custom DNS named {name}.");
            }
        }
        Cmd::Restart => {
            dns.restart_resolver()?;
            println!("Resolver restarted.");
        }
        Cmd::Promo(cmd) => run_promo(dns, cmd)?,
        Cmd::Backup(cmd) => run_backup(dns, cmd)?,
    }
    Ok(())
}

fn run_promo(dns: &mut DnsChanger, command: PromoCmd) -> anyhow::Result<()> {
    match command {
        PromoCmd::Show => {
            let promo = dns.promo();
            println!("{}", promo.raw().unwrap_or("(no NextDNS block stored)"));
        }
        PromoCmd::Set { file } => {
            let text = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut text = String::new();
                    std::io::stdin().read_to_string(&mut text)?;
                    text
                }
            };
            dns.save_promo(&PromoDocument::new(text.trim()))?;
            println!("NextDNS block saved.");
        }
        PromoCmd::Connect => {
            dns.connect_promo()?;
            println!("Connected to NextDNS.");
        }
    }
    Ok(())
}

fn run_backup(dns: &mut DnsChanger, command: BackupCmd) -> anyhow::Result<()> {
    match command {
        BackupCmd::Create => {
            let name = dns
                .create_backup()
                .map_err(|e| anyhow::anyhow!(backup_error(&e, &dns.config().resolved_conf)))?;
            println!("Backup created: {name}");
        }
        BackupCmd::List => {
            let names = dns.list_backups()?;
            if names.is_empty() {
                println!("(empty)");
            }
            for name in names {
                println!("{name}");
            }
        }
        BackupCmd::Restore { name } => {
            dns.restore_backup(&name)?;
            println!("Backup restored.");
        }
        BackupCmd::RestoreLatest => {
            let name = dns.restore_latest()?;
            println!("Backup restored: {name}");
        }
        BackupCmd::Delete { name } => {
            dns.delete_backup(&name)?;
            println!("Backup deleted.");
        }
        BackupCmd::Clean => {
            dns.clean_backups()?;
            println!("All backups removed.");
        }
    }
    Ok(())
}

/// Backup failures are usually an unreadable resolver file; say which one.
fn backup_error(err: &ChangerError, source: &Path) -> String {
    if err.is_permission_denied() {
        format!("{err} (cannot read {})", source.display())
    } else {
        err.to_string()
    }
}

fn valid_name(name: &str) -> bool {
    (1..=40).contains(&name.chars().count())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
}

/// Accepts an IP address, optionally followed by `#<tls server name>`.
fn valid_address(addr: &str) -> bool {
    addr.split('#')
        .next()
        .is_some_and(|ip| ip.parse::<IpAddr>().is_ok())
}
