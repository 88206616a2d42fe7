//! DNS provider entries.

use serde::{Deserialize, Serialize};

/// A named resolver configuration.
///
/// # Example
///
/// ```
/// use dns_changer::Provider;
///
/// let p = Provider::custom("Home", Provider::resolve_block(&["192.168.1.1"], true), "192.168.1.1");
///
/// assert_eq!(p.config, "[Resolve]\nDNS=192.168.1.1\nDNSOverTLS=yes\n");
/// assert!(p.custom);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    /// Display name; unique within a [`ProviderStore`](crate::ProviderStore).
    pub name: String,

    /// Resolver file contents written verbatim on connect.
    pub config: String,

    /// Primary address, used to recognise the active provider and as the
    /// ping target.
    pub ip: String,

    /// `true` for user-added providers. Only these are ever persisted.
    pub custom: bool,
}

impl Provider {
    /// Creates a user-defined provider.
    #[must_use]
    pub fn custom(name: impl Into<String>, config: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: config.into(),
            ip: ip.into(),
            custom: true,
        }
    }

    /// Creates a built-in provider.
    #[must_use]
    pub fn builtin(name: impl Into<String>, config: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            custom: false,
            ..Self::custom(name, config, ip)
        }
    }

    /// Builds a `[Resolve]` block for the given addresses.
    ///
    /// Empty addresses are skipped, so optional secondary / IPv6 fields can
    /// be passed straight through.
    #[must_use]
    pub fn resolve_block(addresses: &[&str], dns_over_tls: bool) -> String {
        let line = addresses
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let tls = if dns_over_tls { "yes" } else { "no" };
        format!("[Resolve]\nDNS={line}\nDNSOverTLS={tls}\n")
    }

    pub(crate) fn from_entry(name: String, entry: ProviderEntry, default_custom: bool) -> Self {
        Self {
            name,
            config: entry.config,
            ip: entry.ip,
            custom: entry.custom.unwrap_or(default_custom),
        }
    }

    pub(crate) fn to_entry(&self) -> ProviderEntry {
        ProviderEntry {
            config: self.config.clone(),
            ip: self.ip.clone(),
            custom: Some(self.custom),
        }
    }
}

/// On-disk shape of one provider: `{"config": .., "ip": .., "custom": ..}`.
///
/// Unknown fields are ignored and missing ones defaulted so hand-edited
/// documents still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ProviderEntry {
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<bool>,
}

/// Well-known public resolvers compiled into the binary, in display order.
#[must_use]
pub fn builtin_providers() -> Vec<Provider> {
    [
        ("Google", "8.8.8.8", "8.8.4.4"),
        ("Cloudflare", "1.1.1.1", "1.0.0.1"),
        ("Quad9", "9.9.9.9", "149.112.112.112"),
        ("AdGuard", "94.140.14.14", "94.140.15.15"),
    ]
    .into_iter()
    .map(|(name, primary, secondary)| {
        Provider::builtin(name, Provider::resolve_block(&[primary, secondary], true), primary)
    })
    .collect()
}
