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

//! The key-management tools API for building file encryption and decryption
//! properties that work with a Key Management Server

use crate::encryption::decrypt::{AadPrefixVerifier, FileDecryptionProperties};
use crate::encryption::encrypt::FileEncryptionProperties;
use crate::encryption::key_management::key_unwrapper::KeyUnwrapper;
use crate::encryption::key_management::key_wrapper::KeyWrapper;
use crate::encryption::key_management::kms::{KmsClientFactory, KmsConnectionConfig};
use crate::encryption::key_management::kms_manager::KmsManager;
use crate::encryption::ParquetCipher;
use crate::errors::{EncryptionError, Result};
use log::debug;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

const DEFAULT_CACHE_LIFETIME: Duration = Duration::from_secs(600);

/// Configuration for encrypting a Parquet file
#[derive(Debug)]
pub struct EncryptionConfiguration {
    footer_key: String,
    column_keys: HashMap<String, Vec<String>>,
    uniform_encryption: bool,
    encryption_algorithm: ParquetCipher,
    plaintext_footer: bool,
    double_wrapping: bool,
    cache_lifetime: Option<Duration>,
    internal_key_material: bool,
    data_key_length_bits: u32,
}

impl EncryptionConfiguration {
    /// Create a new builder for an [`EncryptionConfiguration`]
    pub fn builder(footer_key: String) -> EncryptionConfigurationBuilder {
        EncryptionConfigurationBuilder::new(footer_key)
    }

    /// Master key identifier for footer key encryption or signing
    pub fn footer_key(&self) -> &str {
        &self.footer_key
    }

    /// Map from master key identifiers to the column paths encrypted with the key
    pub fn column_keys(&self) -> &HashMap<String, Vec<String>> {
        &self.column_keys
    }

    /// Whether all columns are encrypted with the footer key
    pub fn uniform_encryption(&self) -> bool {
        self.uniform_encryption
    }

    /// The encryption algorithm to use
    pub fn encryption_algorithm(&self) -> ParquetCipher {
        self.encryption_algorithm
    }

    /// Whether to write the footer in plaintext
    pub fn plaintext_footer(&self) -> bool {
        self.plaintext_footer
    }

    /// Whether to use double wrapping, where data encryption keys (DEKs) are
    /// wrapped with key encryption keys (KEKs), which are then wrapped with
    /// the KMS. This reduces interactions with the KMS.
    pub fn double_wrapping(&self) -> bool {
        self.double_wrapping
    }

    /// How long to cache objects for, including key encryption keys and KMS
    /// clients. When None, objects are cached indefinitely.
    pub fn cache_lifetime(&self) -> Option<Duration> {
        self.cache_lifetime
    }

    /// Whether to store encryption key material inside Parquet file metadata,
    /// rather than in external JSON files.
    /// Using external key material allows for rotation of master keys.
    /// Currently only internal key material is implemented.
    pub fn internal_key_material(&self) -> bool {
        self.internal_key_material
    }

    /// Number of bits for randomly generated data encryption keys
    pub fn data_key_length_bits(&self) -> u32 {
        self.data_key_length_bits
    }
}

/// Builder for a Parquet [`EncryptionConfiguration`]
pub struct EncryptionConfigurationBuilder {
    footer_key: String,
    column_keys: HashMap<String, Vec<String>>,
    uniform_encryption: bool,
    encryption_algorithm: ParquetCipher,
    plaintext_footer: bool,
    double_wrapping: bool,
    cache_lifetime: Option<Duration>,
    internal_key_material: bool,
    data_key_length_bits: u32,
}

impl EncryptionConfigurationBuilder {
    /// Create a new [`EncryptionConfigurationBuilder`] with default options
    pub fn new(footer_key: String) -> Self {
        Self {
            footer_key,
            column_keys: Default::default(),
            uniform_encryption: false,
            encryption_algorithm: ParquetCipher::AesGcmV1,
            plaintext_footer: false,
            double_wrapping: true,
            cache_lifetime: Some(DEFAULT_CACHE_LIFETIME),
            internal_key_material: true,
            data_key_length_bits: 128,
        }
    }

    /// Finalizes the encryption configuration to be used
    pub fn build(self) -> Result<EncryptionConfiguration> {
        if self.footer_key.trim().is_empty() {
            return Err(config_err!("Footer master key identifier is empty"));
        }
        if self.uniform_encryption && !self.column_keys.is_empty() {
            return Err(config_err!(
                "Cannot set both column keys and uniform encryption"
            ));
        }
        if !self.uniform_encryption && self.column_keys.is_empty() {
            return Err(config_err!(
                "Either column keys or uniform encryption must be set"
            ));
        }
        let mut encrypted_columns = std::collections::HashSet::new();
        for column_paths in self.column_keys.values() {
            for column_path in column_paths {
                if !encrypted_columns.insert(column_path.as_str()) {
                    return Err(EncryptionError::Config(format!(
                        "Multiple keys defined for the same column: {column_path}"
                    )));
                }
            }
        }
        match self.data_key_length_bits {
            128 | 192 | 256 => {}
            bits => return Err(config_err!("Wrong data key length : {}", bits)),
        }

        Ok(EncryptionConfiguration {
            footer_key: self.footer_key,
            column_keys: self.column_keys,
            uniform_encryption: self.uniform_encryption,
            encryption_algorithm: self.encryption_algorithm,
            plaintext_footer: self.plaintext_footer,
            double_wrapping: self.double_wrapping,
            cache_lifetime: self.cache_lifetime,
            internal_key_material: self.internal_key_material,
            data_key_length_bits: self.data_key_length_bits,
        })
    }

    /// Specify a column master key identifier and the column paths to be
    /// encrypted with this key
    pub fn add_column_key(mut self, master_key: String, column_paths: Vec<String>) -> Self {
        self.column_keys
            .entry(master_key)
            .or_default()
            .extend(column_paths);
        self
    }

    /// Specify the column keys as a string of the form
    /// `"masterKeyID:colPath,colPath;masterKeyID:colPath,..."`.
    /// Whitespace around every token is ignored.
    pub fn set_column_keys(mut self, column_keys: &str) -> Result<Self> {
        for key_to_columns in column_keys.split(';') {
            let key_to_columns = key_to_columns.trim();
            if key_to_columns.is_empty() {
                continue;
            }

            let parts: Vec<&str> = key_to_columns.split(':').collect();
            if parts.len() != 2 {
                return Err(EncryptionError::Config(format!(
                    "Incorrect key to columns mapping in column keys property: [{key_to_columns}]"
                )));
            }

            let master_key_id = parts[0].trim();
            if master_key_id.is_empty() {
                return Err(config_err!("Empty key name in column keys property"));
            }

            let column_paths = parts[1].trim();
            let mut columns = Vec::new();
            for column_path in column_paths.split(',') {
                let column_path = column_path.trim();
                if column_path.is_empty() {
                    return Err(EncryptionError::Config(format!(
                        "Empty column name in column keys property for key: {master_key_id}"
                    )));
                }
                columns.push(column_path.to_owned());
            }
            if columns.is_empty() {
                return Err(EncryptionError::Config(format!(
                    "No columns to encrypt defined for key: {master_key_id}"
                )));
            }

            self.column_keys
                .entry(master_key_id.to_owned())
                .or_default()
                .extend(columns);
        }
        Ok(self)
    }

    /// Set whether all columns are encrypted with the footer key.
    /// Mutually exclusive with column keys.
    pub fn set_uniform_encryption(mut self, uniform_encryption: bool) -> Self {
        self.uniform_encryption = uniform_encryption;
        self
    }

    /// Set the encryption algorithm to use
    pub fn set_encryption_algorithm(mut self, algorithm: ParquetCipher) -> Self {
        self.encryption_algorithm = algorithm;
        self
    }

    /// Set whether to write the footer in plaintext.
    /// Defaults to false.
    pub fn set_plaintext_footer(mut self, plaintext_footer: bool) -> Self {
        self.plaintext_footer = plaintext_footer;
        self
    }

    /// Set whether to use double wrapping.
    /// Defaults to true.
    pub fn set_double_wrapping(mut self, double_wrapping: bool) -> Self {
        self.double_wrapping = double_wrapping;
        self
    }

    /// Set how long to cache objects for, including key encryption keys
    /// and KMS clients. When None, objects are cached indefinitely.
    /// Defaults to 10 minutes.
    pub fn set_cache_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.cache_lifetime = lifetime;
        self
    }

    /// Set whether to store key material inside the Parquet file metadata.
    /// Defaults to true.
    pub fn set_internal_key_material(mut self, internal_key_material: bool) -> Self {
        self.internal_key_material = internal_key_material;
        self
    }

    /// Set the length in bits of randomly generated data encryption keys.
    /// One of 128, 192 or 256; defaults to 128.
    pub fn set_data_key_length_bits(mut self, data_key_length_bits: u32) -> Self {
        self.data_key_length_bits = data_key_length_bits;
        self
    }
}

/// Configuration for decrypting a Parquet file
pub struct DecryptionConfiguration {
    cache_lifetime: Option<Duration>,
    footer_key: Option<Vec<u8>>,
    column_keys: HashMap<String, Vec<u8>>,
    aad_prefix: Option<Vec<u8>>,
    aad_prefix_verifier: Option<Arc<dyn AadPrefixVerifier>>,
    check_footer_integrity: bool,
}

impl std::fmt::Debug for DecryptionConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionConfiguration")
            .field("cache_lifetime", &self.cache_lifetime)
            .field("check_footer_integrity", &self.check_footer_integrity)
            .finish()
    }
}

impl DecryptionConfiguration {
    /// Create a new builder for a [`DecryptionConfiguration`]
    pub fn builder() -> DecryptionConfigurationBuilder {
        DecryptionConfigurationBuilder::default()
    }

    /// How long to cache objects for, including decrypted key encryption keys
    /// and KMS clients. When None, objects are cached indefinitely.
    pub fn cache_lifetime(&self) -> Option<Duration> {
        self.cache_lifetime
    }
}

impl Default for DecryptionConfiguration {
    fn default() -> Self {
        DecryptionConfigurationBuilder::default().build()
    }
}

/// Builder for a Parquet [`DecryptionConfiguration`]
pub struct DecryptionConfigurationBuilder {
    cache_lifetime: Option<Duration>,
    footer_key: Option<Vec<u8>>,
    column_keys: HashMap<String, Vec<u8>>,
    aad_prefix: Option<Vec<u8>>,
    aad_prefix_verifier: Option<Arc<dyn AadPrefixVerifier>>,
    check_footer_integrity: bool,
}

impl DecryptionConfigurationBuilder {
    /// Create a new [`DecryptionConfigurationBuilder`] with default options
    pub fn new() -> Self {
        Self {
            cache_lifetime: Some(DEFAULT_CACHE_LIFETIME),
            footer_key: None,
            column_keys: HashMap::default(),
            aad_prefix: None,
            aad_prefix_verifier: None,
            check_footer_integrity: true,
        }
    }

    /// Finalizes the decryption configuration to be used
    pub fn build(self) -> DecryptionConfiguration {
        DecryptionConfiguration {
            cache_lifetime: self.cache_lifetime,
            footer_key: self.footer_key,
            column_keys: self.column_keys,
            aad_prefix: self.aad_prefix,
            aad_prefix_verifier: self.aad_prefix_verifier,
            check_footer_integrity: self.check_footer_integrity,
        }
    }

    /// Set how long to cache objects for, including decrypted key encryption
    /// keys and KMS clients. When None, objects are cached indefinitely.
    pub fn set_cache_lifetime(mut self, cache_lifetime: Option<Duration>) -> Self {
        self.cache_lifetime = cache_lifetime;
        self
    }

    /// Provide the footer key directly, bypassing the KMS for the footer
    pub fn set_footer_key(mut self, footer_key: Vec<u8>) -> Self {
        self.footer_key = Some(footer_key);
        self
    }

    /// Provide a column key directly, bypassing the KMS for the column
    pub fn add_column_key(mut self, column_path: &str, key: Vec<u8>) -> Self {
        self.column_keys.insert(column_path.to_owned(), key);
        self
    }

    /// Set the AAD prefix to use for files that do not store their prefix
    pub fn set_aad_prefix(mut self, aad_prefix: Vec<u8>) -> Self {
        self.aad_prefix = Some(aad_prefix);
        self
    }

    /// Set a verifier for AAD prefixes stored in files
    pub fn set_aad_prefix_verifier(mut self, verifier: Arc<dyn AadPrefixVerifier>) -> Self {
        self.aad_prefix_verifier = Some(verifier);
        self
    }

    /// Set whether to verify the signatures of plaintext footers.
    /// Defaults to true.
    pub fn set_check_footer_integrity(mut self, check_footer_integrity: bool) -> Self {
        self.check_footer_integrity = check_footer_integrity;
        self
    }
}

impl Default for DecryptionConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A factory that produces file decryption and encryption properties using
/// configuration options and a KMS client
pub struct CryptoFactory {
    kms_manager: Arc<KmsManager>,
}

impl CryptoFactory {
    /// Create a new [`CryptoFactory`], providing a factory function for
    /// creating KMS clients
    pub fn new<T>(kms_client_factory: T) -> Self
    where
        T: KmsClientFactory + 'static,
    {
        CryptoFactory {
            kms_manager: Arc::new(KmsManager::new(kms_client_factory)),
        }
    }

    /// Create file decryption properties for a Parquet file
    pub fn file_decryption_properties(
        &self,
        kms_connection_config: Arc<KmsConnectionConfig>,
        decryption_configuration: DecryptionConfiguration,
    ) -> Result<Arc<FileDecryptionProperties>> {
        if let Some(footer_key) = &decryption_configuration.footer_key {
            let mut builder = FileDecryptionProperties::builder(footer_key.clone());
            for (column_path, key) in decryption_configuration.column_keys.iter() {
                builder = builder.with_column_key(column_path, key.clone());
            }
            if let Some(aad_prefix) = &decryption_configuration.aad_prefix {
                builder = builder.with_aad_prefix(aad_prefix.clone());
            }
            if let Some(verifier) = &decryption_configuration.aad_prefix_verifier {
                builder = builder.with_aad_prefix_verifier(verifier.clone());
            }
            if !decryption_configuration.check_footer_integrity {
                builder = builder.disable_footer_signature_verification();
            }
            return builder.build();
        }

        let aad_prefix = decryption_configuration.aad_prefix.clone();
        let aad_prefix_verifier = decryption_configuration.aad_prefix_verifier.clone();
        let check_footer_integrity = decryption_configuration.check_footer_integrity;
        let key_retriever = Arc::new(KeyUnwrapper::new(
            self.kms_manager.clone(),
            kms_connection_config,
            decryption_configuration,
        ));
        let mut builder = FileDecryptionProperties::with_key_retriever(key_retriever);
        if let Some(aad_prefix) = aad_prefix {
            builder = builder.with_aad_prefix(aad_prefix);
        }
        if let Some(verifier) = aad_prefix_verifier {
            builder = builder.with_aad_prefix_verifier(verifier);
        }
        if !check_footer_integrity {
            builder = builder.disable_footer_signature_verification();
        }
        builder.build()
    }

    /// Create file encryption properties for a Parquet file
    pub fn file_encryption_properties(
        &self,
        kms_connection_config: Arc<KmsConnectionConfig>,
        encryption_configuration: &EncryptionConfiguration,
    ) -> Result<FileEncryptionProperties> {
        if !encryption_configuration.internal_key_material {
            return Err(config_err!(
                "External key material is not yet implemented"
            ));
        }

        let mut key_wrapper = KeyWrapper::new(
            self.kms_manager.clone(),
            kms_connection_config,
            encryption_configuration,
        );

        let footer_key = self.generate_key(
            encryption_configuration.footer_key(),
            true,
            &mut key_wrapper,
            encryption_configuration.data_key_length_bits,
        )?;

        let mut builder = FileEncryptionProperties::builder(footer_key.key.to_vec())
            .with_footer_key_metadata(footer_key.metadata.clone())
            .with_cipher(encryption_configuration.encryption_algorithm)
            .with_plaintext_footer(encryption_configuration.plaintext_footer);

        for (master_key_id, column_paths) in &encryption_configuration.column_keys {
            for column_path in column_paths {
                let column_key = self.generate_key(
                    master_key_id,
                    false,
                    &mut key_wrapper,
                    encryption_configuration.data_key_length_bits,
                )?;
                builder = builder.with_column_key_and_metadata(
                    column_path,
                    column_key.key.to_vec(),
                    column_key.metadata.clone(),
                );
            }
        }

        builder.build()
    }

    fn generate_key(
        &self,
        master_key_identifier: &str,
        is_footer_key: bool,
        key_wrapper: &mut KeyWrapper,
        data_key_length_bits: u32,
    ) -> Result<GeneratedKey> {
        let rng = SystemRandom::new();
        let mut key = Zeroizing::new(vec![0u8; data_key_length_bits as usize / 8]);
        rng.fill(&mut key)?;

        debug!("Generated data encryption key wrapped by master key '{master_key_identifier}'");
        let key_metadata =
            key_wrapper.get_key_metadata(&key, master_key_identifier, is_footer_key)?;

        Ok(GeneratedKey { key, metadata: key_metadata })
    }
}

struct GeneratedKey {
    key: Zeroizing<Vec<u8>>,
    metadata: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::key_management::key_material::KeyMaterialBuilder;
    use crate::encryption::key_management::kms::KmsClientFactory;
    use crate::encryption::key_management::test_kms::TestKmsClientFactory;

    #[test]
    fn test_file_decryption_properties() {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let config = Default::default();

        let crypto_factory = CryptoFactory::new(TestKmsClientFactory::with_default_keys());
        let decryption_props = crypto_factory
            .file_decryption_properties(kms_config, config)
            .unwrap();

        let expected_dek = "1234567890123450".as_bytes().to_vec();
        let kms = TestKmsClientFactory::with_default_keys()
            .create_client(&Default::default())
            .unwrap();

        let wrapped_key = kms.wrap_key(&expected_dek, "kc1").unwrap();
        let key_material = KeyMaterialBuilder::for_column_key()
            .with_single_wrapped_key("kc1".to_owned(), wrapped_key)
            .build()
            .unwrap();
        let serialized_key_material = key_material.serialize().unwrap();

        let dek = decryption_props
            .footer_key(Some(serialized_key_material.as_bytes()))
            .unwrap()
            .into_owned();

        assert_eq!(dek, expected_dek);
    }

    #[test]
    fn test_kms_client_caching_with_lifetime() {
        test_kms_client_caching(Some(Duration::from_secs(6000)));
    }

    #[test]
    fn test_kms_client_caching_no_lifetime() {
        test_kms_client_caching(None);
    }

    fn test_kms_client_caching(cache_lifetime: Option<Duration>) {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let config = DecryptionConfiguration::builder()
            .set_cache_lifetime(cache_lifetime)
            .build();

        let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
        let crypto_factory = CryptoFactory::new(kms_factory.clone());
        let decryption_props = crypto_factory
            .file_decryption_properties(kms_config.clone(), config)
            .unwrap();

        let dek = "1234567890123450".as_bytes().to_vec();
        let kms = TestKmsClientFactory::with_default_keys()
            .create_client(&Default::default())
            .unwrap();

        let wrapped_key = kms.wrap_key(&dek, "kc1").unwrap();
        let key_material = KeyMaterialBuilder::for_column_key()
            .with_single_wrapped_key("kc1".to_owned(), wrapped_key)
            .build()
            .unwrap();
        let serialized_key_material = key_material.serialize().unwrap();

        assert_eq!(0, kms_factory.invocations().len());

        decryption_props
            .footer_key(Some(serialized_key_material.as_bytes()))
            .unwrap()
            .into_owned();
        assert_eq!(vec!["DEFAULT"], kms_factory.invocations());

        decryption_props
            .footer_key(Some(serialized_key_material.as_bytes()))
            .unwrap()
            .into_owned();
        // Same client should have been reused
        assert_eq!(vec!["DEFAULT"], kms_factory.invocations());

        kms_config.refresh_key_access_token("super_secret".to_owned());

        decryption_props
            .footer_key(Some(serialized_key_material.as_bytes()))
            .unwrap()
            .into_owned();
        // New key access token should have been used
        assert_eq!(vec!["DEFAULT", "super_secret"], kms_factory.invocations());

        decryption_props
            .footer_key(Some(serialized_key_material.as_bytes()))
            .unwrap()
            .into_owned();
        assert_eq!(vec!["DEFAULT", "super_secret"], kms_factory.invocations());
    }

    #[test]
    fn test_kms_client_expiration() {
        let time_controller =
            crate::encryption::key_management::kms_manager::mock_time::time_controller();

        let kms_config = Arc::new(KmsConnectionConfig::default());
        let config = DecryptionConfiguration::builder()
            .set_cache_lifetime(Some(Duration::from_secs(600)))
            .build();

        let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
        let crypto_factory = CryptoFactory::new(kms_factory.clone());
        let decryption_props = crypto_factory
            .file_decryption_properties(kms_config.clone(), config)
            .unwrap();

        let dek = "1234567890123450".as_bytes().to_vec();
        let kms = TestKmsClientFactory::with_default_keys()
            .create_client(&Default::default())
            .unwrap();

        let wrapped_key = kms.wrap_key(&dek, "kc1").unwrap();
        let key_material = KeyMaterialBuilder::for_column_key()
            .with_single_wrapped_key("kc1".to_owned(), wrapped_key)
            .build()
            .unwrap();
        let serialized_key_material = key_material.serialize().unwrap();

        assert_eq!(0, kms_factory.invocations().len());

        let do_key_retrieval = || {
            decryption_props
                .footer_key(Some(serialized_key_material.as_bytes()))
                .unwrap()
                .into_owned();
        };

        do_key_retrieval();
        assert_eq!(1, kms_factory.invocations().len());

        time_controller.advance(Duration::from_secs(599));

        do_key_retrieval();
        assert_eq!(1, kms_factory.invocations().len());

        time_controller.advance(Duration::from_secs(1));

        do_key_retrieval();
        assert_eq!(2, kms_factory.invocations().len());
    }

    #[test]
    fn test_round_trip_double_wrapping_properties() {
        round_trip_encryption_properties(true);
    }

    #[test]
    fn test_round_trip_single_wrapping_properties() {
        round_trip_encryption_properties(false);
    }

    #[test]
    fn test_uniform_encryption() {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_uniform_encryption(true)
            .set_double_wrapping(true)
            .build()
            .unwrap();

        let crypto_factory = CryptoFactory::new(TestKmsClientFactory::with_default_keys());

        let file_encryption_properties = crypto_factory
            .file_encryption_properties(kms_config.clone(), &encryption_config)
            .unwrap();

        assert!(file_encryption_properties.column_keys().is_empty());
    }

    #[test]
    fn test_column_keys_xor_uniform_encryption() {
        let result = EncryptionConfigurationBuilder::new("kf".to_owned()).build();
        assert!(matches!(result, Err(EncryptionError::Config(_))));

        let result = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_uniform_encryption(true)
            .add_column_key("kc1".to_owned(), vec!["x".to_owned()])
            .build();
        assert!(matches!(result, Err(EncryptionError::Config(_))));
    }

    #[test]
    fn test_column_keys_string_parsing() {
        let config = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_column_keys(" kc1 : a , b ; kc2:c;")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            config.column_keys().get("kc1"),
            Some(&vec!["a".to_owned(), "b".to_owned()])
        );
        assert_eq!(config.column_keys().get("kc2"), Some(&vec!["c".to_owned()]));
    }

    #[test]
    fn test_column_keys_string_errors() {
        // Missing key to columns separator
        let result =
            EncryptionConfigurationBuilder::new("kf".to_owned()).set_column_keys("kc1;kc2:a");
        assert!(matches!(result, Err(EncryptionError::Config(_))));

        // Empty key name
        let result =
            EncryptionConfigurationBuilder::new("kf".to_owned()).set_column_keys(" :a,b");
        assert!(matches!(result, Err(EncryptionError::Config(_))));

        // Empty column name
        let result =
            EncryptionConfigurationBuilder::new("kf".to_owned()).set_column_keys("kc1:a,,b");
        assert!(matches!(result, Err(EncryptionError::Config(_))));

        // Duplicate column across keys
        let result = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_column_keys("kc1:a;kc2:a")
            .unwrap()
            .build();
        assert!(matches!(result, Err(EncryptionError::Config(_))));
    }

    #[test]
    fn test_invalid_data_key_length() {
        let result = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_uniform_encryption(true)
            .set_data_key_length_bits(129)
            .build();
        assert!(matches!(result, Err(EncryptionError::Config(_))));
    }

    #[test]
    fn test_larger_data_key_lengths() {
        for bits in [192, 256] {
            let kms_config = Arc::new(KmsConnectionConfig::default());
            let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
                .set_uniform_encryption(true)
                .set_data_key_length_bits(bits)
                .build()
                .unwrap();

            let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
            let crypto_factory = CryptoFactory::new(kms_factory.clone());

            let file_encryption_properties = crypto_factory
                .file_encryption_properties(kms_config.clone(), &encryption_config)
                .unwrap();
            assert_eq!(
                file_encryption_properties.footer_key().len(),
                bits as usize / 8
            );

            let decryption_properties = crypto_factory
                .file_decryption_properties(kms_config, Default::default())
                .unwrap();
            let retrieved = decryption_properties
                .footer_key(
                    file_encryption_properties
                        .footer_key_metadata()
                        .map(|k| k.as_slice()),
                )
                .unwrap();
            assert_eq!(file_encryption_properties.footer_key(), &retrieved.to_vec());
        }
    }

    fn round_trip_encryption_properties(double_wrapping: bool) {
        let kms_config = Arc::new(KmsConnectionConfig::default());
        let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
            .set_double_wrapping(double_wrapping)
            .add_column_key("kc1".to_owned(), vec!["x0".to_owned(), "x1".to_owned()])
            .add_column_key("kc2".to_owned(), vec!["x2".to_owned(), "x3".to_owned()])
            .build()
            .unwrap();

        let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
        let crypto_factory = CryptoFactory::new(kms_factory.clone());

        let file_encryption_properties = crypto_factory
            .file_encryption_properties(kms_config.clone(), &encryption_config)
            .unwrap();

        let decryption_properties = crypto_factory
            .file_decryption_properties(kms_config.clone(), Default::default())
            .unwrap();

        assert!(file_encryption_properties.encrypt_footer());
        assert!(file_encryption_properties.aad_prefix().is_none());
        assert_eq!(16, file_encryption_properties.footer_key().len());

        let retrieved_footer_key = decryption_properties
            .footer_key(
                file_encryption_properties
                    .footer_key_metadata()
                    .map(|k| k.as_slice()),
            )
            .unwrap();
        assert_eq!(
            file_encryption_properties.footer_key(),
            &retrieved_footer_key.to_vec()
        );

        let column_keys = file_encryption_properties.column_keys();
        let mut all_columns: Vec<String> = column_keys.keys().cloned().collect();
        all_columns.sort();
        assert_eq!(vec!["x0", "x1", "x2", "x3"], all_columns);
        for (column_name, column_key) in column_keys.iter() {
            assert_eq!(16, column_key.key().len());

            let retrieved_key = decryption_properties
                .column_key(
                    column_name,
                    column_key.key_metadata().map(|k| k.as_slice()),
                )
                .unwrap();
            assert_eq!(column_key.key(), &retrieved_key.to_vec());
        }

        assert_eq!(1, kms_factory.invocations().len());
        if double_wrapping {
            // With double wrapping, only need to wrap one KEK per master key id used
            assert_eq!(3, kms_factory.keys_wrapped());
            assert_eq!(3, kms_factory.keys_unwrapped());
        } else {
            // With single wrapping, need to wrap the footer key and a DEK per column
            assert_eq!(5, kms_factory.keys_wrapped());
            assert_eq!(5, kms_factory.keys_unwrapped());
        }
    }

    #[test]
    fn test_key_encryption_key_write_caching() {
        let time_controller =
            crate::encryption::key_management::kms_manager::mock_time::time_controller();

        let kms_config = Arc::new(KmsConnectionConfig::default());
        let kms_factory = Arc::new(TestKmsClientFactory::with_default_keys());
        let crypto_factory = CryptoFactory::new(kms_factory.clone());

        let encryption_config = || {
            EncryptionConfigurationBuilder::new("kf".to_owned())
                .set_uniform_encryption(true)
                .set_double_wrapping(true)
                .build()
                .unwrap()
        };

        // Writing two files with the same master key should only wrap one KEK
        crypto_factory
            .file_encryption_properties(kms_config.clone(), &encryption_config())
            .unwrap();
        assert_eq!(1, kms_factory.keys_wrapped());

        crypto_factory
            .file_encryption_properties(kms_config.clone(), &encryption_config())
            .unwrap();
        assert_eq!(1, kms_factory.keys_wrapped());

        // Once the cache lifetime elapses a fresh KEK is generated and wrapped
        time_controller.advance(Duration::from_secs(601));
        crypto_factory
            .file_encryption_properties(kms_config.clone(), &encryption_config())
            .unwrap();
        assert_eq!(2, kms_factory.keys_wrapped());
    }
}
