//! Provider registry merged from compiled-in defaults and JSON documents.
//!
//! Layers, later overriding earlier on a name collision:
//!
//! 1. [`builtin_providers`]
//! 2. bundled defaults document (`custom` defaults to `false`)
//! 3. legacy per-user document (`custom` defaults to `true`)
//! 4. custom providers document (`custom` forced to `true`)
//!
//! An override keeps the position of the entry it replaces, so iteration
//! order is stable across reloads.

use crate::config::ChangerConfig;
use crate::error::{ChangerError, Result};
use crate::provider::{Provider, ProviderEntry, builtin_providers};
use crate::util::{read_json_lenient, write_json_pretty};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// How a layer decides each entry's `custom` flag.
#[derive(Debug, Clone, Copy)]
enum CustomFlag {
    /// Use the stored value, or this default when absent.
    Default(bool),
    /// Ignore the stored value.
    Forced(bool),
}

/// The effective provider mapping and the documents it is built from.
#[derive(Debug, Clone)]
pub struct ProviderStore {
    bundled_path: PathBuf,
    legacy_path: PathBuf,
    custom_path: PathBuf,
    providers: Vec<Provider>,
}

impl ProviderStore {
    /// Creates a store reading the documents named by `config`, and loads it.
    #[must_use]
    pub fn open(config: &ChangerConfig) -> Self {
        Self::with_paths(
            config.bundled_defaults_path(),
            config.legacy_providers_path(),
            config.custom_providers_path(),
        )
    }

    /// Creates a store over explicit document paths, and loads it.
    #[must_use]
    pub fn with_paths(
        bundled_path: impl Into<PathBuf>,
        legacy_path: impl Into<PathBuf>,
        custom_path: impl Into<PathBuf>,
    ) -> Self {
        let mut store = Self {
            bundled_path: bundled_path.into(),
            legacy_path: legacy_path.into(),
            custom_path: custom_path.into(),
            providers: Vec::new(),
        };
        store.load();
        store
    }

    /// Rebuilds the effective mapping from all four layers.
    ///
    /// Never fails: a missing or malformed document contributes nothing.
    pub fn load(&mut self) -> &[Provider] {
        let mut providers = builtin_providers();
        merge_layer(&mut providers, &self.bundled_path, CustomFlag::Default(false));
        merge_layer(&mut providers, &self.legacy_path, CustomFlag::Default(true));
        merge_layer(&mut providers, &self.custom_path, CustomFlag::Forced(true));

        tracing::debug!(count = providers.len(), "Loaded DNS providers");
        self.providers = providers;
        &self.providers
    }

    /// Writes every custom provider to the custom document, replacing it.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::Io`] or [`ChangerError::Json`] if the document
    /// cannot be written.
    pub fn save(&self) -> Result<()> {
        let document: Map<String, Value> = self
            .providers
            .iter()
            .filter(|p| p.custom)
            .map(|p| -> Result<(String, Value)> {
                Ok((p.name.clone(), serde_json::to_value(p.to_entry())?))
            })
            .collect::<Result<_>>()?;

        write_json_pretty(&self.custom_path, &document)?;
        tracing::debug!(
            path = %self.custom_path.display(),
            count = document.len(),
            "Saved custom DNS providers"
        );
        Ok(())
    }

    /// Adds a custom provider and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::DuplicateName`] if `name` is taken, or the
    /// error from [`save`](Self::save). On a failed save the mapping is left
    /// as it was.
    pub fn add(&mut self, name: &str, config: &str, ip: &str) -> Result<()> {
        if self.get(name).is_some() {
            return Err(ChangerError::DuplicateName {
                name: name.to_string(),
            });
        }

        self.providers.push(Provider::custom(name, config, ip));
        if let Err(e) = self.save() {
            self.providers.pop();
            return Err(e);
        }

        tracing::info!(name = %name, ip = %ip, "Added custom DNS provider");
        Ok(())
    }

    /// Removes a custom provider and persists the remaining set.
    ///
    /// Returns `false` without touching anything if `name` is unknown or a
    /// built-in.
    ///
    /// # Errors
    ///
    /// Returns the error from [`save`](Self::save). On a failed save the
    /// provider is put back.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let Some(index) = self.providers.iter().position(|p| p.name == name && p.custom) else {
            tracing::debug!(name = %name, "No custom DNS provider with that name, skipping");
            return Ok(false);
        };

        let removed = self.providers.remove(index);
        if let Err(e) = self.save() {
            self.providers.insert(index, removed);
            return Err(e);
        }

        tracing::info!(name = %name, "Removed custom DNS provider");
        Ok(true)
    }

    /// Looks up a provider by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// The effective mapping, in merge order.
    #[must_use]
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Names of user-added providers, in merge order.
    #[must_use]
    pub fn custom_names(&self) -> Vec<&str> {
        self.providers
            .iter()
            .filter(|p| p.custom)
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// Overlays one document onto `providers`.
fn merge_layer(providers: &mut Vec<Provider>, path: &Path, flag: CustomFlag) {
    let Some(document) = read_json_lenient::<Map<String, Value>>(path) else {
        return;
    };

    for (name, value) in document {
        let entry: ProviderEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    name = %name,
                    path = %path.display(),
                    error = %e,
                    "Skipping malformed DNS provider entry"
                );
                continue;
            }
        };

        let provider = match flag {
            CustomFlag::Default(custom) => Provider::from_entry(name, entry, custom),
            CustomFlag::Forced(custom) => Provider {
                custom,
                ..Provider::from_entry(name, entry, custom)
            },
        };

        if let Some(existing) = providers.iter_mut().find(|p| p.name == provider.name) {
            *existing = provider;
            continue;
        }
        providers.push(provider);
    }
}
