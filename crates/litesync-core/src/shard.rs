//! Shard identity and the names derived from it.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifies one logical replication domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardConfig {
    #[serde(rename = "appID")]
    pub app_id: String,
    pub shard_num: u32,
    /// Publications requested by the user. Empty selects the default
    /// publication over schema `public`.
    #[serde(default)]
    pub publications: Vec<String>,
}

impl ShardConfig {
    pub fn new(app_id: impl Into<String>, shard_num: u32, publications: Vec<String>) -> Self {
        Self {
            app_id: app_id.into(),
            shard_num,
            publications,
        }
    }

    /// Check every name that ends up in SQL before anything touches upstream.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_app_id(&self.app_id) {
            return Err(Error::InvalidAppId(self.app_id.clone()));
        }
        for name in &self.publications {
            if name.is_empty() || name.starts_with('_') {
                return Err(Error::InvalidPublication(name.clone()));
            }
        }
        Ok(())
    }

    /// Upstream schema holding the shard's bookkeeping tables.
    pub fn schema(&self) -> String {
        format!("{}_{}", self.app_id, self.shard_num)
    }

    /// Internal publication over the shard's own tables.
    pub fn metadata_publication(&self) -> String {
        format!("_{}_metadata_{}", self.app_id, self.shard_num)
    }

    /// Publication created when the user configured none.
    pub fn default_publication(&self) -> String {
        format!("_{}_public_{}", self.app_id, self.shard_num)
    }

    /// User-facing publications, with the default substituted when empty.
    pub fn requested_publications(&self) -> Vec<String> {
        let mut publications = if self.publications.is_empty() {
            vec![self.default_publication()]
        } else {
            self.publications.clone()
        };
        publications.sort();
        publications.dedup();
        publications
    }

    /// Every publication the sync reads from, sorted.
    pub fn all_publications(&self) -> Vec<String> {
        let mut publications = self.requested_publications();
        publications.push(self.metadata_publication());
        publications.sort();
        publications
    }

    /// Prefix shared by every replication slot of this shard.
    pub fn slot_prefix(&self) -> String {
        format!("{}_{}_", self.app_id, self.shard_num)
    }

    /// A fresh slot name for a sync started at `unix_millis`.
    pub fn slot_name(&self, unix_millis: u64) -> String {
        format!("{}{}", self.slot_prefix(), unix_millis)
    }

    /// Whether `slot_name` was produced by [`Self::slot_name`] for this shard.
    ///
    /// App ids may contain underscores, so `zero_1_` is also a prefix of
    /// every slot of app `zero_1`. Only an all-digit suffix matches.
    pub fn owns_slot(&self, slot_name: &str) -> bool {
        slot_name
            .strip_prefix(&self.slot_prefix())
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    }
}

/// `^[a-z0-9_]+$`
pub fn is_valid_app_id(app_id: &str) -> bool {
    !app_id.is_empty()
        && app_id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}
