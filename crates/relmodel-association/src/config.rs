//! Association behaviour switches.

use serde::{Deserialize, Serialize};

/// Configuration shared by every handle created from one `Db`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Overwrite every column of related rows that already exist instead of
    /// leaving them untouched when saving an association.
    pub full_save_associations: bool,
}

impl AssociationConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether related rows are upserted with all their columns.
    #[must_use]
    pub fn full_save_associations(mut self, value: bool) -> Self {
        self.full_save_associations = value;
        self
    }
}
