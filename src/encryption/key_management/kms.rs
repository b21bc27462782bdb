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

//! API for interacting with a Key Management Server

use crate::encryption::key_management::key_encryption::{
    decrypt_encryption_key, encrypt_encryption_key,
};
use crate::errors::{EncryptionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use zeroize::Zeroizing;

/// The access token used when none is provided
pub const KEY_ACCESS_TOKEN_DEFAULT: &str = "DEFAULT";

/// The KMS instance ID used when none is provided
pub const KMS_INSTANCE_ID_DEFAULT: &str = "DEFAULT";

/// The KMS instance URL used when none is provided
pub const KMS_INSTANCE_URL_DEFAULT: &str = "DEFAULT";

/// A client for interacting with a Key Management Server (KMS).
/// This should be implemented by user code for integration with your KMS,
/// and wraps and unwraps keys against master keys it manages.
pub trait KmsClient: Send + Sync {
    /// Take a randomly generated key and encrypt it with the master key
    /// with the provided identifier
    fn wrap_key(&self, key_bytes: &[u8], master_key_identifier: &str) -> Result<String>;

    /// Decrypt a wrapped key with the master key with the provided identifier
    fn unwrap_key(&self, wrapped_key: &str, master_key_identifier: &str) -> Result<Vec<u8>>;
}

/// A reference counted [`KmsClient`]
pub type KmsClientRef = Arc<dyn KmsClient>;

/// A factory that creates [`KmsClient`] instances for a KMS connection configuration
pub trait KmsClientFactory: Send + Sync {
    /// Create a client for the KMS described by the connection configuration
    fn create_client(&self, kms_connection_config: &KmsConnectionConfig) -> Result<KmsClientRef>;
}

impl<T> KmsClientFactory for T
where
    T: Fn(&KmsConnectionConfig) -> Result<KmsClientRef> + Send + Sync,
{
    fn create_client(&self, kms_connection_config: &KmsConnectionConfig) -> Result<KmsClientRef> {
        self(kms_connection_config)
    }
}

/// Configuration for connecting to a Key Management Server
#[derive(Debug)]
pub struct KmsConnectionConfig {
    kms_instance_id: String,
    kms_instance_url: String,
    key_access_token: RwLock<String>,
    custom_kms_conf: HashMap<String, String>,
}

impl Clone for KmsConnectionConfig {
    fn clone(&self) -> Self {
        Self {
            kms_instance_id: self.kms_instance_id.clone(),
            kms_instance_url: self.kms_instance_url.clone(),
            key_access_token: RwLock::new(self.key_access_token()),
            custom_kms_conf: self.custom_kms_conf.clone(),
        }
    }
}

impl Default for KmsConnectionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl KmsConnectionConfig {
    /// Create a new builder for a [`KmsConnectionConfig`]
    pub fn builder() -> KmsConnectionConfigBuilder {
        KmsConnectionConfigBuilder::new()
    }

    /// The identifier of the KMS instance to use.
    /// May be empty if the KMS does not distinguish instances, or if it is
    /// to be taken from the footer key material when reading a file.
    pub fn kms_instance_id(&self) -> &str {
        &self.kms_instance_id
    }

    /// The URL of the KMS instance to use.
    /// May be empty under the same conditions as the instance ID.
    pub fn kms_instance_url(&self) -> &str {
        &self.kms_instance_url
    }

    /// The current authorization token passed to the KMS
    pub fn key_access_token(&self) -> String {
        self.key_access_token.read().unwrap().clone()
    }

    /// Additional KMS-specific configuration options
    pub fn custom_kms_conf(&self) -> &HashMap<String, String> {
        &self.custom_kms_conf
    }

    /// Update the authorization token to be passed to the KMS
    pub fn refresh_key_access_token(&self, key_access_token: String) {
        let mut token = self.key_access_token.write().unwrap();
        *token = key_access_token;
    }

    pub(crate) fn set_kms_instance_id(&mut self, kms_instance_id: String) {
        self.kms_instance_id = kms_instance_id;
    }

    pub(crate) fn set_kms_instance_url(&mut self, kms_instance_url: String) {
        self.kms_instance_url = kms_instance_url;
    }
}

/// Builder for a [`KmsConnectionConfig`]
pub struct KmsConnectionConfigBuilder {
    kms_instance_id: String,
    kms_instance_url: String,
    key_access_token: String,
    custom_kms_conf: HashMap<String, String>,
}

impl Default for KmsConnectionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KmsConnectionConfigBuilder {
    /// Create a new [`KmsConnectionConfigBuilder`] with default options
    pub fn new() -> Self {
        Self {
            kms_instance_id: KMS_INSTANCE_ID_DEFAULT.to_owned(),
            kms_instance_url: KMS_INSTANCE_URL_DEFAULT.to_owned(),
            key_access_token: KEY_ACCESS_TOKEN_DEFAULT.to_owned(),
            custom_kms_conf: HashMap::default(),
        }
    }

    /// Finalizes the KMS connection configuration to be used
    pub fn build(self) -> KmsConnectionConfig {
        KmsConnectionConfig {
            kms_instance_id: self.kms_instance_id,
            kms_instance_url: self.kms_instance_url,
            key_access_token: RwLock::new(self.key_access_token),
            custom_kms_conf: self.custom_kms_conf,
        }
    }

    /// Set the KMS instance identifier
    pub fn set_kms_instance_id(mut self, kms_instance_id: String) -> Self {
        self.kms_instance_id = kms_instance_id;
        self
    }

    /// Set the KMS instance URL
    pub fn set_kms_instance_url(mut self, kms_instance_url: String) -> Self {
        self.kms_instance_url = kms_instance_url;
        self
    }

    /// Set the authorization token to be passed to the KMS
    pub fn set_key_access_token(mut self, key_access_token: String) -> Self {
        self.key_access_token = key_access_token;
        self
    }

    /// Set a custom KMS-specific configuration option
    pub fn set_custom_kms_conf_option(mut self, key: String, value: String) -> Self {
        self.custom_kms_conf.insert(key, value);
        self
    }
}

/// A KMS that can hand out raw master keys, allowing keys to be wrapped
/// locally rather than in the KMS
pub trait MasterKeyProvider: Send + Sync {
    /// Get the raw bytes of the master key with the provided identifier
    fn get_master_key(&self, master_key_identifier: &str) -> Result<Vec<u8>>;
}

const LOCAL_WRAP_NO_KEY_VERSION: &str = "NO_VERSION";

/// The envelope stored for keys wrapped locally with a fetched master key
#[derive(Debug, Serialize, Deserialize)]
struct LocalKeyWrap {
    #[serde(rename = "masterKeyVersion")]
    master_key_version: String,
    #[serde(rename = "encryptedKey")]
    encrypted_key: String,
}

impl LocalKeyWrap {
    fn create_serialized(encrypted_encoded_key: String) -> Result<String> {
        let wrap = LocalKeyWrap {
            master_key_version: LOCAL_WRAP_NO_KEY_VERSION.to_owned(),
            encrypted_key: encrypted_encoded_key,
        };
        serde_json::to_string(&wrap)
            .map_err(|e| kms_err!("Error serializing local key wrap to JSON: {}", e))
    }

    fn parse(wrapped_key: &str) -> Result<Self> {
        serde_json::from_str(wrapped_key)
            .map_err(|e| key_material_err!("Failed to parse local key wrap JSON: {}", e))
    }
}

/// A [`KmsClient`] that fetches master keys from a [`MasterKeyProvider`] once,
/// caches them, and performs key wrapping locally with AES-GCM.
/// Used when round trips to the KMS per wrapped key are too expensive
/// and handing master keys to clients is acceptable.
pub struct LocalWrapKmsClient {
    master_key_provider: Arc<dyn MasterKeyProvider>,
    master_key_cache: Mutex<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl LocalWrapKmsClient {
    /// Create a local-wrapping client on top of the provided master key source
    pub fn new(master_key_provider: Arc<dyn MasterKeyProvider>) -> Self {
        Self {
            master_key_provider,
            master_key_cache: Mutex::new(HashMap::default()),
        }
    }

    fn master_key(&self, master_key_identifier: &str) -> Result<Zeroizing<Vec<u8>>> {
        let mut cache = self.master_key_cache.lock().unwrap();
        match cache.get(master_key_identifier) {
            Some(key) => Ok(key.clone()),
            None => {
                let key = Zeroizing::new(
                    self.master_key_provider
                        .get_master_key(master_key_identifier)?,
                );
                cache.insert(master_key_identifier.to_owned(), key.clone());
                Ok(key)
            }
        }
    }
}

impl KmsClient for LocalWrapKmsClient {
    fn wrap_key(&self, key_bytes: &[u8], master_key_identifier: &str) -> Result<String> {
        let master_key = self.master_key(master_key_identifier)?;
        let encrypted_encoded_key =
            encrypt_encryption_key(key_bytes, master_key_identifier.as_bytes(), &master_key)?;
        LocalKeyWrap::create_serialized(encrypted_encoded_key)
    }

    fn unwrap_key(&self, wrapped_key: &str, master_key_identifier: &str) -> Result<Vec<u8>> {
        let key_wrap = LocalKeyWrap::parse(wrapped_key)?;
        if key_wrap.master_key_version != LOCAL_WRAP_NO_KEY_VERSION {
            return Err(EncryptionError::Kms(format!(
                "Master key versions are not supported for local wrapping: {}",
                key_wrap.master_key_version
            )));
        }
        let master_key = self.master_key(master_key_identifier)?;
        decrypt_encryption_key(
            &key_wrap.encrypted_key,
            master_key_identifier.as_bytes(),
            &master_key,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMasterKeys {
        keys: HashMap<String, Vec<u8>>,
    }

    impl MasterKeyProvider for FixedMasterKeys {
        fn get_master_key(&self, master_key_identifier: &str) -> Result<Vec<u8>> {
            self.keys
                .get(master_key_identifier)
                .cloned()
                .ok_or_else(|| {
                    EncryptionError::KeyNotFound(master_key_identifier.to_owned())
                })
        }
    }

    fn local_wrap_client() -> LocalWrapKmsClient {
        let mut keys = HashMap::default();
        keys.insert("kf".to_owned(), b"0123456789012345".to_vec());
        LocalWrapKmsClient::new(Arc::new(FixedMasterKeys { keys }))
    }

    #[test]
    fn test_local_wrap_round_trip() {
        let client = local_wrap_client();

        let dek = b"1234567890123450";
        let wrapped = client.wrap_key(dek, "kf").unwrap();
        // The wrapped form is a versioned JSON envelope
        assert!(wrapped.contains("NO_VERSION"));

        let unwrapped = client.unwrap_key(&wrapped, "kf").unwrap();
        assert_eq!(unwrapped, dek);
    }

    #[test]
    fn test_local_wrap_unknown_master_key() {
        let client = local_wrap_client();
        let result = client.wrap_key(b"1234567890123450", "missing");
        assert!(matches!(result, Err(EncryptionError::KeyNotFound(_))));
    }

    #[test]
    fn test_local_wrap_rejects_versioned_keys() {
        let client = local_wrap_client();
        let wrapped = "{\"masterKeyVersion\":\"v2\",\"encryptedKey\":\"AAAA\"}";
        let result = client.unwrap_key(wrapped, "kf");
        assert!(matches!(result, Err(EncryptionError::Kms(_))));
    }

    #[test]
    fn test_refresh_key_access_token() {
        let config = KmsConnectionConfig::default();
        assert_eq!(config.key_access_token(), KEY_ACCESS_TOKEN_DEFAULT);

        config.refresh_key_access_token("secret".to_owned());
        assert_eq!(config.key_access_token(), "secret");
    }
}
