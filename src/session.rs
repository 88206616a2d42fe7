//! The application session tying all components together.

use crate::backup::BackupManager;
use crate::command::{CommandRunner, SystemRunner};
use crate::config::ChangerConfig;
use crate::error::{ChangerError, Result};
use crate::inspect::{ActiveDns, DnsStatus, StateInspector};
use crate::privileged::{CredentialProvider, PrivilegedExecutor};
use crate::promo::{PromoConfig, PromoDocument};
use crate::provider::Provider;
use crate::store::ProviderStore;
use crate::writer::ResolverWriter;
use std::sync::Arc;

/// One user session: the provider mapping, the cached elevation credential
/// and everything that reads or writes the resolver configuration.
///
/// Owned by the calling surface and passed by `&mut` to each operation;
/// there is no global state, so tests build a fresh session each time.
///
/// # Example
///
/// ```rust,ignore
/// use dns_changer::{ChangerConfig, DnsChanger, TerminalPrompt};
///
/// let mut dns = DnsChanger::open(ChangerConfig::new(), Box::new(TerminalPrompt::default()))?;
/// dns.ensure_initial_backup()?;
/// dns.connect("Cloudflare")?;
/// println!("{}", dns.current_provider());
/// ```
#[derive(Debug)]
pub struct DnsChanger {
    config: ChangerConfig,
    store: ProviderStore,
    promo: PromoConfig,
    executor: PrivilegedExecutor,
    writer: ResolverWriter,
    backups: BackupManager,
    inspector: StateInspector,
}

impl DnsChanger {
    /// Opens a session that runs real system commands.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::Io`] if the config directory cannot be created.
    pub fn open(config: ChangerConfig, credentials: Box<dyn CredentialProvider>) -> Result<Self> {
        Self::with_runner(config, credentials, Arc::new(SystemRunner))
    }

    /// Opens a session with a custom [`CommandRunner`].
    ///
    /// Migrates legacy documents into the config dir and loads the provider
    /// mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::Io`] if the config directory cannot be created.
    pub fn with_runner(
        config: ChangerConfig,
        credentials: Box<dyn CredentialProvider>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        config.migrate_legacy_documents()?;

        let executor = PrivilegedExecutor::new(
            runner.clone(),
            credentials,
            config.sudo_program.clone(),
            Some(config.privileged_timeout),
        );

        Ok(Self {
            store: ProviderStore::open(&config),
            promo: PromoConfig::new(config.promo_path()),
            writer: ResolverWriter::new(&config),
            backups: BackupManager::new(&config),
            inspector: StateInspector::new(&config, runner),
            executor,
            config,
        })
    }

    /// The configuration this session was opened with.
    #[must_use]
    pub const fn config(&self) -> &ChangerConfig {
        &self.config
    }

    // -- providers ---------------------------------------------------------

    /// The effective provider mapping, in merge order.
    #[must_use]
    pub fn providers(&self) -> &[Provider] {
        self.store.providers()
    }

    /// Looks up a provider by name.
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&Provider> {
        self.store.get(name)
    }

    /// Names of user-added providers.
    #[must_use]
    pub fn custom_names(&self) -> Vec<&str> {
        self.store.custom_names()
    }

    /// Re-reads every provider document.
    pub fn reload_providers(&mut self) -> &[Provider] {
        self.store.load()
    }

    /// Adds and persists a custom provider.
    ///
    /// # Errors
    ///
    /// See [`ProviderStore::add`].
    pub fn add_provider(&mut self, name: &str, config: &str, ip: &str) -> Result<()> {
        self.store.add(name, config, ip)
    }

    /// Removes a custom provider. Returns `false` if nothing was removed.
    ///
    /// # Errors
    ///
    /// See [`ProviderStore::remove`].
    pub fn remove_provider(&mut self, name: &str) -> Result<bool> {
        self.store.remove(name)
    }

    /// Writes the named provider's configuration and restarts the resolver.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::UnknownProvider`] if `name` is not in the
    /// mapping, otherwise any [`ResolverWriter::apply`] error.
    pub fn connect(&mut self, name: &str) -> Result<()> {
        let config = self
            .store
            .get(name)
            .map(|p| p.config.clone())
            .ok_or_else(|| ChangerError::UnknownProvider {
                name: name.to_string(),
            })?;

        self.writer.apply(&mut self.executor, &config)?;
        tracing::info!(name = %name, "Switched DNS provider");
        Ok(())
    }

    // -- promo -------------------------------------------------------------

    /// The stored promo document (empty if none).
    #[must_use]
    pub fn promo(&self) -> PromoDocument {
        self.promo.load()
    }

    /// Replaces the stored promo document.
    ///
    /// # Errors
    ///
    /// See [`PromoConfig::save`].
    pub fn save_promo(&self, document: &PromoDocument) -> Result<()> {
        self.promo.save(document)
    }

    /// Writes the normalized promo block and restarts the resolver.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::NoPromoConfig`] if nothing is stored,
    /// otherwise any [`ResolverWriter::apply`] error.
    pub fn connect_promo(&mut self) -> Result<()> {
        let block = self.promo.load().block().ok_or(ChangerError::NoPromoConfig)?;
        self.writer.apply(&mut self.executor, &block)?;
        tracing::info!("Switched to NextDNS");
        Ok(())
    }

    /// Restarts the resolver without rewriting its file, e.g. to finish an
    /// operation that ended in [`ChangerError::PartialApply`].
    ///
    /// # Errors
    ///
    /// See [`ResolverWriter::restart`].
    pub fn restart_resolver(&mut self) -> Result<()> {
        self.writer.restart(&mut self.executor)
    }

    // -- state -------------------------------------------------------------

    /// Which provider the system resolver file currently matches.
    #[must_use]
    pub fn current_provider(&self) -> ActiveDns {
        self.inspector.current_provider(&self.store, &self.promo.load())
    }

    /// Active provider, connectivity and latency in one snapshot.
    #[must_use]
    pub fn status(&self, skip_connectivity: bool) -> DnsStatus {
        self.inspector
            .status(&self.store, &self.promo.load(), skip_connectivity)
    }

    /// See [`StateInspector::check_connectivity`].
    #[must_use]
    pub fn check_connectivity(&self) -> bool {
        self.inspector.check_connectivity()
    }

    /// See [`StateInspector::ping_time`].
    #[must_use]
    pub fn ping_time(&self, address: &str) -> String {
        self.inspector.ping_time(address)
    }

    // -- backups -----------------------------------------------------------

    /// See [`BackupManager::ensure_initial_backup`].
    ///
    /// # Errors
    ///
    /// See [`BackupManager::ensure_initial_backup`].
    pub fn ensure_initial_backup(&self) -> Result<bool> {
        self.backups.ensure_initial_backup()
    }

    /// See [`BackupManager::create_backup`].
    ///
    /// # Errors
    ///
    /// See [`BackupManager::create_backup`].
    pub fn create_backup(&self) -> Result<String> {
        self.backups.create_backup()
    }

    /// See [`BackupManager::list`].
    ///
    /// # Errors
    ///
    /// See [`BackupManager::list`].
    pub fn list_backups(&self) -> Result<Vec<String>> {
        self.backups.list()
    }

    /// Restores the named backup with elevation.
    ///
    /// # Errors
    ///
    /// See [`BackupManager::restore`].
    pub fn restore_backup(&mut self, name: &str) -> Result<()> {
        self.backups.restore(name, &self.writer, &mut self.executor)
    }

    /// Restores the latest backup and returns its name.
    ///
    /// # Errors
    ///
    /// See [`BackupManager::restore_latest`].
    pub fn restore_latest(&mut self) -> Result<String> {
        self.backups.restore_latest(&self.writer, &mut self.executor)
    }

    /// See [`BackupManager::delete`].
    ///
    /// # Errors
    ///
    /// See [`BackupManager::delete`].
    pub fn delete_backup(&self, name: &str) -> Result<()> {
        self.backups.delete(name)
    }

    /// See [`BackupManager::clean_all`].
    ///
    /// # Errors
    ///
    /// See [`BackupManager::clean_all`].
    pub fn clean_backups(&self) -> Result<usize> {
        self.backups.clean_all()
    }
}
