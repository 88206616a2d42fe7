//! # dns-changer
//!
//! Switch a Linux host's systemd-resolved configuration between DNS
//! providers, and keep backups so any change can be undone.
//!
//! Providers come from four layers (compiled-in defaults, a bundled
//! defaults document, a legacy per-user document and the user's custom
//! providers), plus one pasted-in "promo" block stored on its own.
//! Connecting to a provider stages its `[Resolve]` block, copies it over
//! `/etc/systemd/resolved.conf` with `sudo` and restarts
//! `systemd-resolved`.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use dns_changer::{ChangerConfig, DnsChanger, TerminalPrompt};
//!
//! let mut dns = DnsChanger::open(ChangerConfig::new(), Box::new(TerminalPrompt::default()))?;
//!
//! // Snapshot the untouched file once.
//! dns.ensure_initial_backup()?;
//!
//! // Switch (prompts for the sudo password the first time).
//! dns.connect("Quad9")?;
//! assert_eq!(dns.current_provider().name(), "Quad9");
//!
//! // Undo.
//! dns.restore_latest()?;
//! ```
//!
//! ## Elevation
//!
//! Privileged steps run as `sudo -S`, with the password supplied by a
//! [`CredentialProvider`] the first time it is needed and cached for the
//! rest of the session. A rejected password is dropped immediately so the
//! next attempt prompts again.
//!
//! ## Status
//!
//! [`DnsChanger::current_provider`] maps the live resolver file back to a
//! provider by substring match on each provider's address, so a file that
//! merely mentions an address (say, in a comment) is reported as that
//! provider. Probes shell out to `dig` and `ping` with hard timeouts and
//! never fail.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backup;
pub mod command;
pub mod config;
pub mod error;
pub mod inspect;
pub mod privileged;
pub mod promo;
pub mod provider;
pub mod session;
pub mod store;
pub mod util;
pub mod writer;

pub use backup::BackupManager;
pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use config::ChangerConfig;
pub use error::{ChangerError, Result};
pub use inspect::{ActiveDns, DnsStatus, StateInspector};
pub use privileged::{CredentialProvider, PrivilegedExecutor, TerminalPrompt};
pub use promo::{PromoConfig, PromoDocument};
pub use provider::Provider;
pub use session::DnsChanger;
pub use store::ProviderStore;
pub use writer::ResolverWriter;
