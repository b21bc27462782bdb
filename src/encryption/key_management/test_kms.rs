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

//! A reference KMS backed by in-memory master keys, for use in tests.
//!
//! Master keys are owned by the [`TestKmsClientFactory`] so that tests remain
//! parallel-safe, and key rotation is modelled by staging a replacement key
//! map and then publishing it.

use crate::encryption::key_management::key_encryption::{
    decrypt_encryption_key, encrypt_encryption_key,
};
use crate::encryption::key_management::kms::{
    KmsClient, KmsClientFactory, KmsClientRef, KmsConnectionConfig, MasterKeyProvider,
};
use crate::errors::{EncryptionError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type MasterKeyMap = Arc<HashMap<String, Vec<u8>>>;

struct MasterKeys {
    active: Mutex<MasterKeyMap>,
    // Key rotation: wrap and unwrap always use the staged map, which is
    // identical to the active map outside of a rotation window
    staged: Mutex<MasterKeyMap>,
}

impl MasterKeys {
    fn new(keys: HashMap<String, Vec<u8>>) -> Self {
        let keys = Arc::new(keys);
        Self {
            active: Mutex::new(keys.clone()),
            staged: Mutex::new(keys),
        }
    }

    fn staged(&self) -> MasterKeyMap {
        self.staged.lock().unwrap().clone()
    }
}

/// Shared state and instrumentation for [`InMemoryKms`] clients.
/// Creates clients for a [`CryptoFactory`](super::crypto_factory::CryptoFactory)
/// and records how often the KMS was used, so tests can assert on caching
/// behavior.
pub struct TestKmsClientFactory {
    master_keys: Arc<MasterKeys>,
    denied_keys: HashSet<String>,
    invocations: Mutex<Vec<String>>,
    keys_wrapped: Arc<AtomicUsize>,
    keys_unwrapped: Arc<AtomicUsize>,
}

impl TestKmsClientFactory {
    /// Create a factory with the key map used throughout the tests
    pub fn with_default_keys() -> Self {
        let mut keys = HashMap::default();
        keys.insert("kf".to_owned(), "0123456789012345".as_bytes().to_vec());
        keys.insert("kc1".to_owned(), "1234567890123450".as_bytes().to_vec());
        keys.insert("kc2".to_owned(), "1234567890123451".as_bytes().to_vec());
        Self::with_keys(keys)
    }

    /// Create a factory with the provided master keys
    pub fn with_keys(keys: HashMap<String, Vec<u8>>) -> Self {
        Self {
            master_keys: Arc::new(MasterKeys::new(keys)),
            denied_keys: HashSet::default(),
            invocations: Mutex::new(Vec::new()),
            keys_wrapped: Arc::new(AtomicUsize::new(0)),
            keys_unwrapped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Deny access to a master key. Clients return
    /// [`EncryptionError::KeyAccessDenied`] when it is used.
    pub fn deny_access_to(mut self, master_key_identifier: &str) -> Self {
        self.denied_keys.insert(master_key_identifier.to_owned());
        self
    }

    /// Stage a replacement master key map, as the first phase of key rotation
    pub fn start_key_rotation(&self, new_keys: HashMap<String, Vec<u8>>) {
        let mut staged = self.master_keys.staged.lock().unwrap();
        *staged = Arc::new(new_keys);
    }

    /// Publish the staged master key map, completing key rotation
    pub fn finish_key_rotation(&self) {
        let staged = self.master_keys.staged.lock().unwrap().clone();
        let mut active = self.master_keys.active.lock().unwrap();
        *active = staged;
    }

    /// The key access tokens used for each client creation
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    /// The number of keys wrapped by clients of this factory
    pub fn keys_wrapped(&self) -> usize {
        self.keys_wrapped.load(Ordering::SeqCst)
    }

    /// The number of keys unwrapped by clients of this factory
    pub fn keys_unwrapped(&self) -> usize {
        self.keys_unwrapped.load(Ordering::SeqCst)
    }
}

impl KmsClientFactory for TestKmsClientFactory {
    fn create_client(&self, kms_connection_config: &KmsConnectionConfig) -> Result<KmsClientRef> {
        self.invocations
            .lock()
            .unwrap()
            .push(kms_connection_config.key_access_token());
        Ok(Arc::new(InMemoryKms {
            master_keys: self.master_keys.clone(),
            denied_keys: self.denied_keys.clone(),
            keys_wrapped: self.keys_wrapped.clone(),
            keys_unwrapped: self.keys_unwrapped.clone(),
        }))
    }
}

impl KmsClientFactory for Arc<TestKmsClientFactory> {
    fn create_client(&self, kms_connection_config: &KmsConnectionConfig) -> Result<KmsClientRef> {
        self.as_ref().create_client(kms_connection_config)
    }
}

/// A KMS client that wraps keys with master keys held in memory
pub struct InMemoryKms {
    master_keys: Arc<MasterKeys>,
    denied_keys: HashSet<String>,
    keys_wrapped: Arc<AtomicUsize>,
    keys_unwrapped: Arc<AtomicUsize>,
}

impl InMemoryKms {
    fn master_key(&self, master_key_identifier: &str) -> Result<Vec<u8>> {
        if self.denied_keys.contains(master_key_identifier) {
            return Err(EncryptionError::KeyAccessDenied(
                master_key_identifier.to_owned(),
            ));
        }
        // Always use the latest key version
        match self.master_keys.staged().get(master_key_identifier) {
            Some(key) => Ok(key.clone()),
            None => Err(EncryptionError::KeyNotFound(
                master_key_identifier.to_owned(),
            )),
        }
    }
}

impl KmsClient for InMemoryKms {
    fn wrap_key(&self, key_bytes: &[u8], master_key_identifier: &str) -> Result<String> {
        let master_key = self.master_key(master_key_identifier)?;
        self.keys_wrapped.fetch_add(1, Ordering::SeqCst);
        encrypt_encryption_key(key_bytes, master_key_identifier.as_bytes(), &master_key)
    }

    fn unwrap_key(&self, wrapped_key: &str, master_key_identifier: &str) -> Result<Vec<u8>> {
        let master_key = self.master_key(master_key_identifier)?;
        self.keys_unwrapped.fetch_add(1, Ordering::SeqCst);
        decrypt_encryption_key(wrapped_key, master_key_identifier.as_bytes(), &master_key)
    }
}

impl MasterKeyProvider for InMemoryKms {
    fn get_master_key(&self, master_key_identifier: &str) -> Result<Vec<u8>> {
        self.master_key(master_key_identifier)
    }
}
