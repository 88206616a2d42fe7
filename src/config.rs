//! Paths, external programs and timeouts.

use std::path::PathBuf;
use std::time::Duration;

/// Directory name under the user's config dir.
pub const PROJECT_ID: &str = "dns-changer";

/// Legacy per-user document; also the name of the bundled defaults file.
pub const DEFAULT_DNS_FILE: &str = "dns_configs.json";

/// Per-user custom providers document.
pub const CUSTOM_DNS_FILE: &str = "custom_dns.json";

/// Promo provider document.
pub const PROMO_FILE: &str = "promo_nextdns.json";

const RESOLVED_CONF_PATH: &str = "/etc/systemd/resolved.conf";
const RESOLVED_SERVICE: &str = "systemd-resolved";

/// Runtime configuration shared by every component.
///
/// # Example
///
/// ```
/// use dns_changer::ChangerConfig;
///
/// let config = ChangerConfig::new()
///     .with_config_dir("/tmp/dns-changer")
///     .with_resolved_conf("/tmp/resolved.conf");
///
/// assert_eq!(config.backups_dir(), std::path::Path::new("/tmp/dns-changer/backups"));
/// assert_eq!(config.service, "systemd-resolved");
/// ```
#[derive(Debug, Clone)]
pub struct ChangerConfig {
    /// Per-user state directory (`~/.config/dns-changer`).
    pub config_dir: PathBuf,

    /// Directory shipped next to the binary holding bundled defaults.
    pub data_dir: PathBuf,

    /// The system resolver configuration file.
    pub resolved_conf: PathBuf,

    /// Where the staged resolver file is created before the privileged copy.
    pub scratch_dir: PathBuf,

    /// Resolver service restarted after every write.
    pub service: String,

    /// Elevation tool. Must accept `-S` (password on stdin) and `-p`.
    pub sudo_program: String,

    /// Copy tool run under elevation.
    pub copy_program: String,

    /// Service manager run under elevation.
    pub systemctl_program: String,

    /// Short-name lookup tool used for the connectivity probe.
    pub dig_program: String,

    /// Reachability probe.
    pub ping_program: String,

    /// Name looked up by the connectivity probe.
    pub probe_host: String,

    /// Upper bound for the connectivity probe.
    pub probe_timeout: Duration,

    /// Upper bound for a single ping.
    pub ping_timeout: Duration,

    /// Upper bound for each privileged command.
    pub privileged_timeout: Duration,
}

impl ChangerConfig {
    /// Creates a config with the standard locations and programs.
    #[must_use]
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(PROJECT_ID);
        let data_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("data")))
            .unwrap_or_else(|| PathBuf::from("data"));

        Self {
            config_dir,
            data_dir,
            resolved_conf: PathBuf::from(RESOLVED_CONF_PATH),
            scratch_dir: std::env::temp_dir(),
            service: RESOLVED_SERVICE.to_string(),
            sudo_program: "sudo".to_string(),
            copy_program: "cp".to_string(),
            systemctl_program: "systemctl".to_string(),
            dig_program: "dig".to_string(),
            ping_program: "ping".to_string(),
            probe_host: "google.com".to_string(),
            probe_timeout: Duration::from_secs(3),
            ping_timeout: Duration::from_secs(3),
            privileged_timeout: Duration::from_secs(60),
        }
    }

    /// Overrides the per-user state directory.
    #[must_use]
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Overrides the bundled data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Overrides the system resolver file.
    #[must_use]
    pub fn with_resolved_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolved_conf = path.into();
        self
    }

    /// Overrides where the staged resolver file is written.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Overrides the resolver service name.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Overrides the timeout applied to privileged commands.
    #[must_use]
    pub const fn with_privileged_timeout(mut self, timeout: Duration) -> Self {
        self.privileged_timeout = timeout;
        self
    }

    /// Overrides the connectivity probe timeout.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Directory holding resolver file snapshots.
    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.config_dir.join("backups")
    }

    /// Defaults shipped with the project, merged on every load.
    #[must_use]
    pub fn bundled_defaults_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_DNS_FILE)
    }

    /// Legacy per-user providers document.
    #[must_use]
    pub fn legacy_providers_path(&self) -> PathBuf {
        self.config_dir.join(DEFAULT_DNS_FILE)
    }

    /// Current per-user custom providers document.
    #[must_use]
    pub fn custom_providers_path(&self) -> PathBuf {
        self.config_dir.join(CUSTOM_DNS_FILE)
    }

    /// Promo provider document.
    #[must_use]
    pub fn promo_path(&self) -> PathBuf {
        self.config_dir.join(PROMO_FILE)
    }

    /// Creates the config dir and copies over any document that still only
    /// exists in the data dir.
    ///
    /// Returns the names of the migrated documents. Individual copy failures
    /// are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the config dir cannot be created.
    pub fn migrate_legacy_documents(&self) -> std::io::Result<Vec<&'static str>> {
        std::fs::create_dir_all(&self.config_dir)?;

        let mut migrated = Vec::new();
        for name in [DEFAULT_DNS_FILE, CUSTOM_DNS_FILE, PROMO_FILE] {
            let legacy = self.data_dir.join(name);
            let current = self.config_dir.join(name);
            if current.exists() || !legacy.exists() {
                continue;
            }
            match std::fs::copy(&legacy, &current) {
                Ok(_) => {
                    tracing::info!(
                        from = %legacy.display(),
                        to = %current.display(),
                        "Migrated legacy document"
                    );
                    migrated.push(name);
                }
                Err(e) => tracing::warn!(
                    path = %legacy.display(),
                    error = %e,
                    "Failed to migrate legacy document"
                ),
            }
        }
        Ok(migrated)
    }

    /// File extension used for backups, taken from the resolver file name.
    #[must_use]
    pub fn backup_extension(&self) -> &str {
        self.resolved_conf
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("conf")
    }
}

impl Default for ChangerConfig {
    fn default() -> Self {
        Self::new()
    }
}
