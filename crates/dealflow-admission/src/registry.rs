//! Block and whitelist registry.

use std::sync::Arc;
use std::time::Duration;

use dealflow_core::domain::{BlockRecord, Identifier, WhitelistEntry};
use dealflow_core::ports::{CounterStore, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::keys::KeySpace;

/// Allow/deny overrides consulted before any quota layer.
///
/// Each entry is a JSON record whose TTL is its expiry. The `blocked` and
/// `whitelisted` sets only serve listings and are pruned lazily.
#[derive(Clone)]
pub struct AccessRegistry {
    store: Arc<dyn CounterStore>,
    keys: KeySpace,
}

impl AccessRegistry {
    pub fn new(store: Arc<dyn CounterStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    pub async fn whitelist_entry(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<WhitelistEntry>, StoreError> {
        self.read(&self.keys.whitelist(identifier)).await
    }

    pub async fn is_whitelisted(&self, identifier: &Identifier) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get(&self.keys.whitelist(identifier))
            .await?
            .is_some())
    }

    /// Whitelist an identifier; `None` means permanent.
    pub async fn whitelist_add(
        &self,
        identifier: &Identifier,
        duration: Option<Duration>,
    ) -> Result<WhitelistEntry, StoreError> {
        let entry = WhitelistEntry::new(duration);
        self.write(&self.keys.whitelist(identifier), &entry, duration)
            .await?;
        self.store
            .set_add(&self.keys.whitelisted_set(), &identifier.to_string())
            .await?;
        Ok(entry)
    }

    /// Returns whether an entry existed.
    pub async fn whitelist_remove(&self, identifier: &Identifier) -> Result<bool, StoreError> {
        let existed = self.store.delete(&self.keys.whitelist(identifier)).await?;
        self.store
            .set_remove(&self.keys.whitelisted_set(), &identifier.to_string())
            .await?;
        Ok(existed)
    }

    pub async fn block_record(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<BlockRecord>, StoreError> {
        self.read(&self.keys.block(identifier)).await
    }

    pub async fn is_blocked(&self, identifier: &Identifier) -> Result<bool, StoreError> {
        Ok(self.store.get(&self.keys.block(identifier)).await?.is_some())
    }

    pub async fn block(
        &self,
        identifier: &Identifier,
        reason: &str,
        duration: Duration,
    ) -> Result<BlockRecord, StoreError> {
        let record = BlockRecord::new(reason, duration);
        self.write(&self.keys.block(identifier), &record, Some(duration))
            .await?;
        self.store
            .set_add(&self.keys.blocked_set(), &identifier.to_string())
            .await?;
        Ok(record)
    }

    /// Returns whether a block existed.
    pub async fn unblock(&self, identifier: &Identifier) -> Result<bool, StoreError> {
        let existed = self.store.delete(&self.keys.block(identifier)).await?;
        self.store
            .set_remove(&self.keys.blocked_set(), &identifier.to_string())
            .await?;
        Ok(existed)
    }

    pub async fn list_whitelisted(&self) -> Result<Vec<(Identifier, WhitelistEntry)>, StoreError> {
        self.list(&self.keys.whitelisted_set(), |id| self.keys.whitelist(id))
            .await
    }

    pub async fn list_blocked(&self) -> Result<Vec<(Identifier, BlockRecord)>, StoreError> {
        self.list(&self.keys.blocked_set(), |id| self.keys.block(id))
            .await
    }

    async fn list<T, F>(&self, set_key: &str, entry_key: F) -> Result<Vec<(Identifier, T)>, StoreError>
    where
        T: DeserializeOwned,
        F: Fn(&Identifier) -> String,
    {
        let mut live = Vec::new();
        for member in self.store.set_members(set_key).await? {
            let Ok(identifier) = member.parse::<Identifier>() else {
                tracing::warn!(set = %set_key, member = %member, "Dropping malformed registry member");
                self.store.set_remove(set_key, &member).await?;
                continue;
            };

            match self.read::<T>(&entry_key(&identifier)).await? {
                Some(entry) => live.push((identifier, entry)),
                None => self.store.set_remove(set_key, &member).await?,
            }
        }
        Ok(live)
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.store
            .get(key)
            .await?
            .map(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e)))
            })
            .transpose()
    }

    async fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let raw =
            serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.set(key, &raw, ttl).await
    }
}
