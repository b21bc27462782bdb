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

//! Configuration and utilities for encrypting files using Parquet Modular Encryption

use crate::encryption::ciphers::{
    BlockEncryptor, CtrBlockEncryptor, GcmBlockEncryptor,
};
use crate::encryption::ParquetCipher;
use crate::errors::{EncryptionError, Result};
use crate::format;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::fmt::Formatter;
use std::sync::{Arc, Mutex};
use zeroize::Zeroize;

const AAD_FILE_UNIQUE_LENGTH: usize = 8;

/// An encryption key with the key metadata stored alongside it in the file
#[derive(Clone, PartialEq)]
pub struct EncryptionKey {
    key: Vec<u8>,
    key_metadata: Option<Vec<u8>>,
}

impl EncryptionKey {
    /// Create an [`EncryptionKey`] without any key metadata
    pub fn new(key: Vec<u8>) -> EncryptionKey {
        Self {
            key,
            key_metadata: None,
        }
    }

    /// Set the serialized key metadata describing how the key was wrapped
    pub fn with_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.key_metadata = Some(metadata);
        self
    }

    /// The raw key bytes
    pub fn key(&self) -> &Vec<u8> {
        &self.key
    }

    /// The serialized key metadata, if any
    pub fn key_metadata(&self) -> Option<&Vec<u8>> {
        self.key_metadata.as_ref()
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey {{ }}")
    }
}

/// `FileEncryptionProperties` hold the encryption keys and options required
/// to encrypt a Parquet file
#[derive(Clone, Debug, PartialEq)]
pub struct FileEncryptionProperties {
    cipher: ParquetCipher,
    encrypt_footer: bool,
    footer_key: EncryptionKey,
    column_keys: HashMap<String, EncryptionKey>,
    aad_prefix: Option<Vec<u8>>,
    aad_file_unique: Vec<u8>,
    file_aad: Vec<u8>,
    store_aad_prefix: bool,
}

impl FileEncryptionProperties {
    /// Returns a new [`FileEncryptionProperties`] builder that will encrypt
    /// the footer and, under uniform encryption, all columns with the
    /// provided key
    pub fn builder(footer_key: Vec<u8>) -> EncryptionPropertiesBuilder {
        EncryptionPropertiesBuilder::new(footer_key)
    }

    /// Whether the footer is encrypted, rather than signed plaintext
    pub fn encrypt_footer(&self) -> bool {
        self.encrypt_footer
    }

    /// The cipher used for data modules
    pub fn cipher(&self) -> ParquetCipher {
        self.cipher
    }

    /// The AAD shared by all modules of this file:
    /// the optional AAD prefix followed by the unique file identifier
    pub fn file_aad(&self) -> &[u8] {
        &self.file_aad
    }

    /// The AAD prefix supplied by the application, if any
    pub fn aad_prefix(&self) -> Option<&Vec<u8>> {
        self.aad_prefix.as_ref()
    }

    /// The footer encryption (or signing) key
    pub fn footer_key(&self) -> &Vec<u8> {
        &self.footer_key.key
    }

    /// The footer key metadata, if any
    pub fn footer_key_metadata(&self) -> Option<&Vec<u8>> {
        self.footer_key.key_metadata.as_ref()
    }

    /// Per-column encryption keys, keyed by dotted column path.
    /// Empty when uniform encryption is used.
    pub fn column_keys(&self) -> &HashMap<String, EncryptionKey> {
        &self.column_keys
    }

    /// True when a reader must supply the AAD prefix out of band because it
    /// is not stored in the file
    pub fn supply_aad_prefix(&self) -> bool {
        self.aad_prefix.is_some() && !self.store_aad_prefix
    }

    /// The thrift algorithm record to store in the file
    pub fn encryption_algorithm(&self) -> format::EncryptionAlgorithm {
        let stored_prefix = if self.store_aad_prefix {
            self.aad_prefix.clone()
        } else {
            None
        };
        let supply_aad_prefix = self.aad_prefix.as_ref().map(|_| !self.store_aad_prefix);
        self.cipher
            .to_thrift(stored_prefix, self.aad_file_unique.clone(), supply_aad_prefix)
    }
}

/// Builder for [`FileEncryptionProperties`]
pub struct EncryptionPropertiesBuilder {
    cipher: ParquetCipher,
    footer_key: EncryptionKey,
    column_keys: HashMap<String, EncryptionKey>,
    aad_prefix: Option<Vec<u8>>,
    encrypt_footer: bool,
    store_aad_prefix: bool,
}

impl EncryptionPropertiesBuilder {
    /// Create a new [`EncryptionPropertiesBuilder`] with default options
    pub fn new(footer_key: Vec<u8>) -> EncryptionPropertiesBuilder {
        Self {
            cipher: ParquetCipher::default(),
            footer_key: EncryptionKey::new(footer_key),
            column_keys: HashMap::default(),
            aad_prefix: None,
            encrypt_footer: true,
            store_aad_prefix: true,
        }
    }

    /// Set the cipher to encrypt data modules with
    pub fn with_cipher(mut self, cipher: ParquetCipher) -> Self {
        self.cipher = cipher;
        self
    }

    /// Set whether to write the footer in plaintext, authenticated with a
    /// signature, rather than encrypting it. Defaults to false.
    pub fn with_plaintext_footer(mut self, plaintext_footer: bool) -> Self {
        self.encrypt_footer = !plaintext_footer;
        self
    }

    /// Set the key metadata stored with the footer key
    pub fn with_footer_key_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.footer_key.key_metadata = Some(metadata);
        self
    }

    /// Set the encryption key for a column. Columns without a key remain
    /// plaintext, unless no column keys at all are configured, in which case
    /// all columns are encrypted with the footer key.
    pub fn with_column_key(mut self, column_path: &str, key: Vec<u8>) -> Self {
        self.column_keys
            .insert(column_path.to_owned(), EncryptionKey::new(key));
        self
    }

    /// Set the encryption key and key metadata for a column
    pub fn with_column_key_and_metadata(
        mut self,
        column_path: &str,
        key: Vec<u8>,
        metadata: Vec<u8>,
    ) -> Self {
        self.column_keys.insert(
            column_path.to_owned(),
            EncryptionKey::new(key).with_metadata(metadata),
        );
        self
    }

    /// Set the AAD prefix to bind the file to its intended location or use
    pub fn with_aad_prefix(mut self, aad_prefix: Vec<u8>) -> Self {
        self.aad_prefix = Some(aad_prefix);
        self
    }

    /// Set whether the AAD prefix is stored in the file. When disabled,
    /// readers must supply the prefix out of band. Defaults to true.
    pub fn with_aad_prefix_storage(mut self, store_aad_prefix: bool) -> Self {
        self.store_aad_prefix = store_aad_prefix;
        self
    }

    /// Finalize the builder and return the created [`FileEncryptionProperties`]
    pub fn build(self) -> Result<FileEncryptionProperties> {
        validate_key_length(&self.footer_key.key)?;
        for (column_path, column_key) in self.column_keys.iter() {
            validate_key_length(&column_key.key).map_err(|_| {
                EncryptionError::Config(format!(
                    "Invalid key length for column '{column_path}': keys must be 16, 24 or 32 bytes"
                ))
            })?;
        }

        // A fresh unique AAD is generated per file so that module AADs, and
        // therefore nonces, never repeat across files written with one key
        let rng = SystemRandom::new();
        let mut aad_file_unique = vec![0u8; AAD_FILE_UNIQUE_LENGTH];
        rng.fill(&mut aad_file_unique)?;

        let file_aad = match self.aad_prefix.as_ref() {
            None => aad_file_unique.clone(),
            Some(aad_prefix) => [aad_prefix.as_slice(), aad_file_unique.as_slice()].concat(),
        };

        Ok(FileEncryptionProperties {
            cipher: self.cipher,
            encrypt_footer: self.encrypt_footer,
            footer_key: self.footer_key,
            column_keys: self.column_keys,
            aad_prefix: self.aad_prefix,
            aad_file_unique,
            file_aad,
            store_aad_prefix: self.store_aad_prefix,
        })
    }
}

fn validate_key_length(key: &[u8]) -> Result<()> {
    match key.len() {
        16 | 24 | 32 => Ok(()),
        len => Err(config_err!(
            "encryption key must be 16, 24 or 32 bytes in length, got {}",
            len
        )),
    }
}

/// Issues per-module encryptors for one file write operation.
///
/// Metadata modules always use AES-GCM; data modules use the cipher from
/// the encryption properties.
#[derive(Debug)]
pub struct FileEncryptor {
    properties: FileEncryptionProperties,
    // One cipher instance is kept per column and reused for all of the
    // column's modules
    column_meta_encryptors: Mutex<HashMap<String, Arc<dyn BlockEncryptor>>>,
    column_data_encryptors: Mutex<HashMap<String, Arc<dyn BlockEncryptor>>>,
    footer_encryptor: Arc<dyn BlockEncryptor>,
}

impl FileEncryptor {
    /// Create a [`FileEncryptor`] for the file described by the properties
    pub fn new(properties: FileEncryptionProperties) -> Result<Self> {
        let footer_encryptor = Arc::new(GcmBlockEncryptor::new(properties.footer_key())?);
        Ok(Self {
            properties,
            column_meta_encryptors: Mutex::new(HashMap::default()),
            column_data_encryptors: Mutex::new(HashMap::default()),
            footer_encryptor,
        })
    }

    /// The encryption properties this encryptor was created from
    pub fn properties(&self) -> &FileEncryptionProperties {
        &self.properties
    }

    /// The AAD shared by all modules of this file
    pub fn file_aad(&self) -> &[u8] {
        self.properties.file_aad()
    }

    /// Whether data for the column at the given path is encrypted
    pub fn is_column_encrypted(&self, column_path: &str) -> bool {
        // Column is encrypted if uniform encryption is used or a key is set for the column
        self.properties.column_keys.is_empty()
            || self.properties.column_keys.contains_key(column_path)
    }

    /// The encryptor for footer metadata
    pub fn get_footer_encryptor(&self) -> Result<Arc<dyn BlockEncryptor>> {
        Ok(self.footer_encryptor.clone())
    }

    /// The encryptor used to sign the footer of plaintext-footer files.
    /// The signature is computed with the footer key.
    pub fn get_footer_signing_encryptor(&self) -> Result<Arc<dyn BlockEncryptor>> {
        Ok(self.footer_encryptor.clone())
    }

    /// The encryptor for the column metadata module of the column at the
    /// given path
    pub fn get_column_metadata_encryptor(
        &self,
        column_path: &str,
    ) -> Result<Arc<dyn BlockEncryptor>> {
        self.get_column_encryptor(column_path, true)
    }

    /// The encryptor for page and page-header modules of the column at the
    /// given path
    pub fn get_column_data_encryptor(&self, column_path: &str) -> Result<Arc<dyn BlockEncryptor>> {
        self.get_column_encryptor(column_path, false)
    }

    fn get_column_encryptor(
        &self,
        column_path: &str,
        metadata: bool,
    ) -> Result<Arc<dyn BlockEncryptor>> {
        if !self.is_column_encrypted(column_path) {
            return Err(EncryptionError::Config(format!(
                "Column '{column_path}' is not encrypted"
            )));
        }
        let key = match self.properties.column_keys.get(column_path) {
            Some(column_key) => &column_key.key,
            // Uniform encryption, all columns use the footer key
            None => &self.properties.footer_key.key,
        };

        let cache = if metadata {
            &self.column_meta_encryptors
        } else {
            &self.column_data_encryptors
        };
        let mut cache = cache.lock().unwrap();
        if let Some(encryptor) = cache.get(column_path) {
            return Ok(encryptor.clone());
        }

        let encryptor: Arc<dyn BlockEncryptor> =
            if metadata || self.properties.cipher == ParquetCipher::AesGcmV1 {
                Arc::new(GcmBlockEncryptor::new(key)?)
            } else {
                Arc::new(CtrBlockEncryptor::new(key)?)
            };
        cache.insert(column_path.to_owned(), encryptor.clone());
        Ok(encryptor)
    }
}
