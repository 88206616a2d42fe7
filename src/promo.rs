//! The pasted-in promo provider.
//!
//! Stored separately from the provider registry as `{"resolve": "<text>"}`,
//! where the text is either a full `[Resolve]` block or a bare address list.

use crate::error::Result;
use crate::util::{read_json_lenient, write_json_pretty};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Identity reported when the promo block is the active configuration.
pub const PROMO_PROVIDER_NAME: &str = "NextDNS";

/// The persisted promo document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoDocument {
    /// Raw pasted text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve: Option<String>,
}

impl PromoDocument {
    /// Creates a document holding `text`.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            resolve: Some(text.into()),
        }
    }

    /// The stored text, trimmed, or `None` when nothing usable is stored.
    #[must_use]
    pub fn raw(&self) -> Option<&str> {
        self.resolve
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The complete block to write for this document.
    #[must_use]
    pub fn block(&self) -> Option<String> {
        self.raw().map(normalized_block)
    }
}

/// Loads and saves the promo document.
#[derive(Debug, Clone)]
pub struct PromoConfig {
    path: PathBuf,
}

impl PromoConfig {
    /// Creates a handle for the document at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the stored document, or an empty one if missing or malformed.
    #[must_use]
    pub fn load(&self) -> PromoDocument {
        read_json_lenient(&self.path).unwrap_or_default()
    }

    /// Replaces the stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save(&self, document: &PromoDocument) -> Result<()> {
        write_json_pretty(&self.path, document)?;
        tracing::info!(path = %self.path.display(), "Saved NextDNS block");
        Ok(())
    }

    /// Path of the document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Expands a bare address list into a full block; full blocks are returned
/// as given.
///
/// ```
/// use dns_changer::promo::normalized_block;
///
/// assert_eq!(
///     normalized_block("45.90.28.0#abc123.dns.nextdns.io"),
///     "[Resolve]\nDNS=45.90.28.0#abc123.dns.nextdns.io\nDNSOverTLS=yes\n",
/// );
/// assert_eq!(normalized_block("[Resolve]\nDNS=1.2.3.4"), "[Resolve]\nDNS=1.2.3.4");
/// ```
#[must_use]
pub fn normalized_block(raw: &str) -> String {
    let raw = raw.trim();
    if raw.to_ascii_lowercase().starts_with("[resolve]") {
        raw.to_string()
    } else {
        format!("[Resolve]\nDNS={raw}\nDNSOverTLS=yes\n")
    }
}

/// First IPv4 address written as `DNS=<addr>#...` in `block`.
#[must_use]
pub fn primary_address(block: &str) -> Option<Ipv4Addr> {
    block.lines().find_map(|line| {
        let (_, rest) = line.split_once("DNS=")?;
        let (addr, _) = rest.split_once('#')?;
        addr.trim().parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = "[Resolve]\n\
        DNS=45.90.28.0#abc123.dns.nextdns.io\n\
        DNS=2a07:a8c0::#abc123.dns.nextdns.io\n\
        DNS=45.90.30.0#abc123.dns.nextdns.io\n\
        DNS=2a07:a8c1::#abc123.dns.nextdns.io\n\
        DNSOverTLS=yes";

    #[test]
    fn load_missing_or_malformed_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let promo = PromoConfig::new(dir.path().join("promo.json"));
        assert_eq!(promo.load(), PromoDocument::default());

        std::fs::write(promo.path(), "[1, 2").unwrap();
        assert_eq!(promo.load(), PromoDocument::default());
    }

    #[test]
    fn save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let promo = PromoConfig::new(dir.path().join("promo.json"));

        promo.save(&PromoDocument::new("first")).unwrap();
        promo.save(&PromoDocument::new(BLOCK)).unwrap();

        assert_eq!(promo.load().raw(), Some(BLOCK));
        let on_disk = std::fs::read_to_string(promo.path()).unwrap();
        assert!(on_disk.starts_with("{\n    \"resolve\": "));
    }

    #[test]
    fn blank_document_has_no_block() {
        assert!(PromoDocument::new("   \n").block().is_none());
        assert!(PromoDocument::default().block().is_none());
    }

    #[test]
    fn header_match_is_case_insensitive() {
        let block = normalized_block("  [RESOLVE]\nDNS=9.9.9.9\n");
        assert_eq!(block, "[RESOLVE]\nDNS=9.9.9.9");
    }

    #[test]
    fn primary_address_takes_first_ipv4() {
        assert_eq!(primary_address(BLOCK), Some(Ipv4Addr::new(45, 90, 28, 0)));
        assert_eq!(
            primary_address(&normalized_block("45.90.30.0#x.dns.nextdns.io")),
            Some(Ipv4Addr::new(45, 90, 30, 0))
        );
        assert_eq!(primary_address("[Resolve]\nDNS=1.1.1.1\n"), None);
    }
}
