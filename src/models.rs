//! Model catalog: display names and their backing.

use crate::config::{ModelEntry, ModelsConfig};

/// How replies for a model are produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelBinding {
    /// Streamed from the hosted endpoint under `remote_id`.
    Network {
        /// Identifier sent in the request's `model` field.
        remote_id: String,
    },
    /// Canned placeholder reply after a fixed delay.
    Simulated,
}

impl ModelBinding {
    /// Whether the model talks to the network.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Ordered model catalog.
#[derive(Clone, Debug)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
}

impl ModelCatalog {
    /// Build a catalog from configuration.
    #[must_use]
    pub fn new(config: &ModelsConfig) -> Self {
        Self {
            entries: config.catalog.clone(),
        }
    }

    /// Resolve a display name.
    ///
    /// Names absent from the catalog, or present without a remote id, are simulated.
    #[must_use]
    pub fn resolve(&self, name: &str) -> ModelBinding {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.remote_id.clone())
            .map_or(ModelBinding::Simulated, |remote_id| ModelBinding::Network {
                remote_id,
            })
    }

    /// Whether the display name is listed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    /// Display names in picker order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(&ModelsConfig::default())
    }
}
