// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Caching of KMS clients and key encryption keys per KMS access token

use crate::encryption::key_management::key_wrapper::KeyEncryptionKey;
use crate::encryption::key_management::kms::{KmsClientFactory, KmsClientRef, KmsConnectionConfig};
use crate::errors::Result;
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// The current time, adjustable in tests to exercise cache expiry
pub(crate) fn now() -> Instant {
    #[cfg(test)]
    {
        Instant::now() + mock_time::offset()
    }
    #[cfg(not(test))]
    {
        Instant::now()
    }
}


struct ExpiringCacheEntry<V> {
    value: V,
    expiration: Option<Instant>,
}

impl<V> ExpiringCacheEntry<V> {
    fn new(value: V, lifetime: Option<Duration>) -> Self {
        Self {
            value,
            expiration: lifetime.map(|lifetime| now() + lifetime),
        }
    }

    fn is_expired(&self) -> bool {
        match self.expiration {
            None => false,
            Some(expiration) => now() >= expiration,
        }
    }
}

/// A shared handle to the per-token internal cache of a
/// [`TwoLevelCacheWithExpiration`]
pub(crate) type InternalCache<V> = Arc<Mutex<HashMap<String, V>>>;

/// Two-level cache with expiration of internal caches according to the
/// access token lifetime. The external level is keyed by access token,
/// the internal level by an arbitrary string key.
pub(crate) struct TwoLevelCacheWithExpiration<V> {
    state: Mutex<CacheState<V>>,
}

struct CacheState<V> {
    cache: HashMap<String, ExpiringCacheEntry<InternalCache<V>>>,
    last_cleanup: Instant,
}

impl<V> Default for TwoLevelCacheWithExpiration<V> {
    fn default() -> Self {
        Self {
            state: Mutex::new(CacheState {
                cache: HashMap::default(),
                last_cleanup: now(),
            }),
        }
    }
}

impl<V> TwoLevelCacheWithExpiration<V> {
    /// Returns the internal cache for an access token, replacing it with a
    /// fresh empty cache if it is absent or its lifetime has elapsed
    pub(crate) fn get_or_create_internal_cache(
        &self,
        access_token: &str,
        lifetime: Option<Duration>,
    ) -> InternalCache<V> {
        let mut state = self.state.lock().unwrap();
        match state.cache.entry(access_token.to_owned()) {
            Entry::Occupied(entry) if !entry.get().is_expired() => entry.get().value.clone(),
            entry => {
                let internal_cache: InternalCache<V> = Arc::new(Mutex::new(HashMap::default()));
                entry.insert_entry(ExpiringCacheEntry::new(internal_cache.clone(), lifetime));
                internal_cache
            }
        }
    }

    /// Amortized cleanup, invoked on cache operations. Expired entries are
    /// only swept once per cleanup period.
    pub(crate) fn check_cache_for_expired_tokens(&self, cleanup_period: Duration) {
        let mut state = self.state.lock().unwrap();
        let now = now();
        if now >= state.last_cleanup + cleanup_period {
            let before = state.cache.len();
            state.cache.retain(|_, entry| !entry.is_expired());
            let removed = before - state.cache.len();
            if removed > 0 {
                debug!("Evicted {removed} expired cache entries");
            }
            state.last_cleanup = now;
        }
    }

    /// Removes the cache entries for an access token
    pub(crate) fn remove_cache_entries_for_token(&self, access_token: &str) {
        let mut state = self.state.lock().unwrap();
        state.cache.remove(access_token);
    }

    /// Removes the cache entries for all access tokens
    pub(crate) fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.cache.clear();
    }
}

/// Cache of decrypted key encryption keys, keyed by their base64 encoded key id
pub(crate) type KekCache = InternalCache<Vec<u8>>;

/// Write-side cache of key encryption keys, keyed by master key id
pub(crate) type KekWriteCache = InternalCache<KeyEncryptionKey>;

/// Manages the caching of KMS clients and key encryption keys,
/// and allows interaction with the KMS
pub(crate) struct KmsManager {
    kms_client_factory: Mutex<Box<dyn KmsClientFactory>>,
    kms_client_cache: TwoLevelCacheWithExpiration<KmsClientRef>,
    kek_read_caches: TwoLevelCacheWithExpiration<Vec<u8>>,
    kek_write_caches: TwoLevelCacheWithExpiration<KeyEncryptionKey>,
}

impl KmsManager {
    pub fn new<T>(kms_client_factory: T) -> Self
    where
        T: KmsClientFactory + 'static,
    {
        Self {
            kms_client_factory: Mutex::new(Box::new(kms_client_factory)),
            kms_client_cache: TwoLevelCacheWithExpiration::default(),
            kek_read_caches: TwoLevelCacheWithExpiration::default(),
            kek_write_caches: TwoLevelCacheWithExpiration::default(),
        }
    }

    /// Get the KMS client for the connection configuration, creating one via
    /// the client factory if none is cached for the current access token and
    /// KMS instance
    pub fn get_client(
        &self,
        kms_connection_config: &KmsConnectionConfig,
        cache_lifetime: Option<Duration>,
    ) -> Result<KmsClientRef> {
        if let Some(cleanup_period) = cache_lifetime {
            self.kms_client_cache
                .check_cache_for_expired_tokens(cleanup_period);
        }
        let access_token = kms_connection_config.key_access_token();
        let clients = self
            .kms_client_cache
            .get_or_create_internal_cache(&access_token, cache_lifetime);

        let mut clients = clients.lock().unwrap();
        let client = match clients.entry(kms_connection_config.kms_instance_id().to_owned()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                debug!(
                    "Creating KMS client for instance '{}'",
                    kms_connection_config.kms_instance_id()
                );
                let client_factory = self.kms_client_factory.lock().unwrap();
                let client = client_factory.create_client(kms_connection_config)?;
                entry.insert(client.clone());
                client
            }
        };
        Ok(client)
    }

    /// Get the read-side cache of decrypted key encryption keys for the
    /// current access token
    pub fn get_kek_cache(
        &self,
        kms_connection_config: &KmsConnectionConfig,
        cache_lifetime: Option<Duration>,
    ) -> KekCache {
        if let Some(cleanup_period) = cache_lifetime {
            self.kek_read_caches
                .check_cache_for_expired_tokens(cleanup_period);
        }
        let access_token = kms_connection_config.key_access_token();
        self.kek_read_caches
            .get_or_create_internal_cache(&access_token, cache_lifetime)
    }

    /// Get the write-side cache of key encryption keys for the current
    /// access token, shared by all files written with the same token so
    /// that KEKs are wrapped by the KMS only once per master key until
    /// the cache lifetime elapses
    pub fn get_kek_write_cache(
        &self,
        kms_connection_config: &KmsConnectionConfig,
        cache_lifetime: Option<Duration>,
    ) -> KekWriteCache {
        if let Some(cleanup_period) = cache_lifetime {
            self.kek_write_caches
                .check_cache_for_expired_tokens(cleanup_period);
        }
        let access_token = kms_connection_config.key_access_token();
        self.kek_write_caches
            .get_or_create_internal_cache(&access_token, cache_lifetime)
    }

    /// Immediately evict all cached state for an access token
    pub fn remove_cache_entries_for_token(&self, access_token: &str) {
        self.kms_client_cache
            .remove_cache_entries_for_token(access_token);
        self.kek_read_caches
            .remove_cache_entries_for_token(access_token);
        self.kek_write_caches
            .remove_cache_entries_for_token(access_token);
    }

    /// Immediately evict all cached state
    pub fn clear(&self) {
        self.kms_client_cache.clear();
        self.kek_read_caches.clear();
        self.kek_write_caches.clear();
    }
}
