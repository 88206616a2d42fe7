//! Reading back which provider is active, and probing the network.
//!
//! Nothing here returns an error: this is the status path, and an unknown
//! or stale reading is preferable to a failure.

use crate::command::CommandRunner;
use crate::config::ChangerConfig;
use crate::promo::{PROMO_PROVIDER_NAME, PromoDocument, primary_address};
use crate::store::ProviderStore;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Placeholder for a latency or address that could not be determined.
pub const NOT_AVAILABLE: &str = "N/A";

/// Identity reported when no provider matches.
pub const UNKNOWN_PROVIDER: &str = "Unknown";

/// The provider the system resolver file currently matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveDns {
    /// The stored promo block.
    Promo,
    /// An entry of the provider mapping, by name.
    Provider(String),
    /// Nothing matched, or the file could not be read.
    Unknown,
}

impl ActiveDns {
    /// Display name: the provider name, `"NextDNS"` or `"Unknown"`.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Promo => PROMO_PROVIDER_NAME,
            Self::Provider(name) => name,
            Self::Unknown => UNKNOWN_PROVIDER,
        }
    }
}

impl fmt::Display for ActiveDns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A point-in-time view of the resolver state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsStatus {
    /// Which provider is active.
    pub active: ActiveDns,
    /// Address of the active provider, if known.
    pub address: Option<String>,
    /// Whether a lookup through the system resolver succeeded.
    pub connected: bool,
    /// Round-trip time to `address`, e.g. `"12.3 ms"`, or `"N/A"`.
    pub latency: String,
}

/// Reads the resolver file and runs the lookup / ping probes.
pub struct StateInspector {
    runner: Arc<dyn CommandRunner>,
    resolved_conf: PathBuf,
    dig_program: String,
    ping_program: String,
    probe_host: String,
    probe_timeout: Duration,
    ping_timeout: Duration,
}

impl StateInspector {
    /// Creates an inspector using the paths, programs and timeouts of `config`.
    #[must_use]
    pub fn new(config: &ChangerConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            resolved_conf: config.resolved_conf.clone(),
            dig_program: config.dig_program.clone(),
            ping_program: config.ping_program.clone(),
            probe_host: config.probe_host.clone(),
            probe_timeout: config.probe_timeout,
            ping_timeout: config.ping_timeout,
        }
    }

    /// Works out which provider the resolver file belongs to.
    ///
    /// The promo block is checked first (its normalized text must appear in
    /// the file). Then the mapping is scanned in order and the first provider
    /// whose `ip` occurs anywhere in the file wins.
    #[must_use]
    pub fn current_provider(&self, store: &ProviderStore, promo: &PromoDocument) -> ActiveDns {
        let content = match std::fs::read_to_string(&self.resolved_conf) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(
                    path = %self.resolved_conf.display(),
                    error = %e,
                    "Failed to read resolver configuration"
                );
                return ActiveDns::Unknown;
            }
        };
        detect(&content, store, promo)
    }

    /// Returns `true` if a short lookup through the system resolver answers
    /// within the probe timeout.
    #[must_use]
    pub fn check_connectivity(&self) -> bool {
        self.runner
            .run(
                &self.dig_program,
                &["+short", self.probe_host.as_str()],
                None,
                Some(self.probe_timeout),
            )
            .map_or_else(
                |e| {
                    tracing::debug!(host = %self.probe_host, error = %e, "Connectivity probe failed");
                    false
                },
                |output| {
                    let ok = !output.stdout.trim().is_empty();
                    tracing::debug!(host = %self.probe_host, connected = ok, "Connectivity probe finished");
                    ok
                },
            )
    }

    /// Pings `address` once and returns the round-trip time, e.g. `"12.3 ms"`.
    ///
    /// Returns `"N/A"` for an empty or `"N/A"` address, a failed probe or
    /// output without a `time=` token.
    #[must_use]
    pub fn ping_time(&self, address: &str) -> String {
        let address = address.trim();
        if address.is_empty() || address == NOT_AVAILABLE {
            return NOT_AVAILABLE.to_string();
        }

        let output = self
            .runner
            .run(
                &self.ping_program,
                &["-c", "1", "-W", "1", address],
                None,
                Some(self.ping_timeout),
            )
            .inspect_err(|e| tracing::debug!(address = %address, error = %e, "Ping failed"))
            .ok();
        output
            .as_ref()
            .and_then(|output| parse_ping_time(&output.stdout))
            .map_or_else(|| NOT_AVAILABLE.to_string(), |t| format!("{t} ms"))
    }

    /// Collects the active provider, its address, connectivity and latency.
    ///
    /// With `skip_connectivity` the lookup probe is not run and the resolver
    /// is assumed reachable.
    #[must_use]
    pub fn status(
        &self,
        store: &ProviderStore,
        promo: &PromoDocument,
        skip_connectivity: bool,
    ) -> DnsStatus {
        let active = self.current_provider(store, promo);
        let address = match &active {
            ActiveDns::Promo => promo
                .block()
                .and_then(|block| primary_address(&block))
                .map(|addr| addr.to_string()),
            ActiveDns::Provider(name) => store
                .get(name)
                .map(|p| p.ip.clone())
                .filter(|ip| !ip.is_empty()),
            ActiveDns::Unknown => None,
        };
        let connected = skip_connectivity || self.check_connectivity();
        let latency = address
            .as_deref()
            .map_or_else(|| NOT_AVAILABLE.to_string(), |addr| self.ping_time(addr));

        DnsStatus {
            active,
            address,
            connected,
            latency,
        }
    }
}

impl fmt::Debug for StateInspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateInspector")
            .field("resolved_conf", &self.resolved_conf)
            .field("probe_host", &self.probe_host)
            .finish_non_exhaustive()
    }
}

/// Matches resolver file `content` against the promo block and the mapping.
fn detect(content: &str, store: &ProviderStore, promo: &PromoDocument) -> ActiveDns {
    if let Some(block) = promo.block() {
        if content.contains(block.trim()) {
            return ActiveDns::Promo;
        }
    }

    store
        .providers()
        .iter()
        .find(|p| !p.ip.is_empty() && content.contains(p.ip.as_str()))
        .map_or(ActiveDns::Unknown, |p| ActiveDns::Provider(p.name.clone()))
}

/// Extracts the value following `time=` in ping output.
fn parse_ping_time(stdout: &str) -> Option<&str> {
    stdout.lines().find_map(|line| {
        let (_, rest) = line.split_once("time=")?;
        rest.split_whitespace().next()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn store(dir: &Path) -> ProviderStore {
        ProviderStore::with_paths(
            dir.join("bundled.json"),
            dir.join("legacy.json"),
            dir.join("custom.json"),
        )
    }

    #[test]
    fn detects_builtin_by_ip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let active = detect(
            "[Resolve]\nDNS=1.1.1.1 1.0.0.1\nDNSOverTLS=yes\n",
            &store,
            &PromoDocument::default(),
        );
        assert_eq!(active, ActiveDns::Provider("Cloudflare".into()));
        assert_eq!(active.to_string(), "Cloudflare");
    }

    #[test]
    fn address_in_comment_still_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let active = detect(
            "# was 9.9.9.9\n[Resolve]\nDNS=10.9.8.7\n",
            &store,
            &PromoDocument::default(),
        );
        assert_eq!(active, ActiveDns::Provider("Quad9".into()));
    }

    #[test]
    fn unmatched_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let active = detect("[Resolve]\nDNS=10.9.8.7\n", &store, &PromoDocument::default());
        assert_eq!(active, ActiveDns::Unknown);
        assert_eq!(active.name(), "Unknown");
    }

    #[test]
    fn first_match_in_mapping_order_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path());
        store.add("Shadow", "x", "8.8.4.4").unwrap();
        let active = detect("DNS=8.8.4.4\n", &store, &PromoDocument::default());
        assert_eq!(active, ActiveDns::Provider("Shadow".into()));

        let active = detect("DNS=8.8.8.8 8.8.4.4\n", &store, &PromoDocument::default());
        assert_eq!(active, ActiveDns::Provider("Google".into()));
    }

    #[test]
    fn empty_ip_never_matches() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path());
        store.add("Blank", "x", "").unwrap();
        assert_eq!(
            detect("anything", &store, &PromoDocument::default()),
            ActiveDns::Unknown
        );
    }

    #[test]
    fn promo_is_checked_before_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let promo = PromoDocument::new("45.90.28.0#abc.dns.nextdns.io 1.1.1.1");
        let content = "[Resolve]\nDNS=45.90.28.0#abc.dns.nextdns.io 1.1.1.1\nDNSOverTLS=yes\n";
        assert_eq!(detect(content, &store, &promo), ActiveDns::Promo);

        let other = "[Resolve]\nDNS=1.1.1.1\nDNSOverTLS=yes\n";
        assert_eq!(
            detect(other, &store, &promo),
            ActiveDns::Provider("Cloudflare".into())
        );
    }

    #[test]
    fn parses_ping_output() {
        let out = "PING 1.1.1.1 (1.1.1.1) 56(84) bytes of data.\n\
                   64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.3 ms\n\n\
                   --- 1.1.1.1 ping statistics ---\n";
        assert_eq!(parse_ping_time(out), Some("12.3"));
        assert_eq!(parse_ping_time("1 packets transmitted, 0 received"), None);
    }

    // ---------------------------------------------------------------
    // Probes that cannot run
    // ---------------------------------------------------------------

    struct FailingRunner(std::io::ErrorKind);

    impl CommandRunner for FailingRunner {
        fn run(
            &self,
            _program: &str,
            _args: &[&str],
            _stdin: Option<&str>,
            _timeout: Option<Duration>,
        ) -> std::io::Result<crate::command::CommandOutput> {
            Err(self.0.into())
        }
    }

    fn failing_inspector(dir: &Path, kind: std::io::ErrorKind) -> StateInspector {
        let config = ChangerConfig::new().with_resolved_conf(dir.join("resolved.conf"));
        StateInspector::new(&config, Arc::new(FailingRunner(kind)))
    }

    #[test]
    fn timed_out_probes_degrade() {
        let dir = tempfile::tempdir().unwrap();
        let inspector = failing_inspector(dir.path(), std::io::ErrorKind::TimedOut);

        assert!(!inspector.check_connectivity());
        assert_eq!(inspector.ping_time("1.1.1.1"), NOT_AVAILABLE);
    }

    #[test]
    fn missing_tools_degrade_status() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("resolved.conf"),
            "[Resolve]\nDNS=1.1.1.1 1.0.0.1\nDNSOverTLS=yes\n",
        )
        .unwrap();
        let inspector = failing_inspector(dir.path(), std::io::ErrorKind::NotFound);
        let store = store(dir.path());

        let status = inspector.status(&store, &PromoDocument::default(), false);
        assert_eq!(
            status,
            DnsStatus {
                active: ActiveDns::Provider("Cloudflare".into()),
                address: Some("1.1.1.1".into()),
                connected: false,
                latency: NOT_AVAILABLE.into(),
            }
        );
    }
}
