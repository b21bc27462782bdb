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

//! Configuration and utilities for decryption of files using Parquet Modular Encryption

use crate::encryption::ciphers::{
    BlockDecryptor, CtrBlockDecryptor, GcmBlockDecryptor, TAG_LEN,
};
use crate::encryption::modules::{create_footer_aad, create_module_aad, ModuleType};
use crate::encryption::ParquetCipher;
use crate::errors::{EncryptionError, Result};
use crate::format::ColumnCryptoMetaData;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Formatter;
use std::io::Read;
use std::sync::Arc;
use zeroize::{Zeroize, Zeroizing};

/// Trait for retrieving an encryption key using the key's metadata
pub trait KeyRetriever: Send + Sync {
    /// Retrieve a decryption key given the key metadata
    fn retrieve_key(&self, key_metadata: &[u8]) -> Result<Vec<u8>>;
}

/// Verifies the AAD prefix of a file against an application policy before it
/// is used for decryption.
///
/// The verifier is consulted for files that store their AAD prefix; a reader
/// that supplies the prefix itself has already asserted which file it
/// expects to read.
pub trait AadPrefixVerifier: Send + Sync {
    /// Verify the AAD prefix taken from the file. Return an error to reject
    /// the file.
    fn verify(&self, aad_prefix: &[u8]) -> Result<()>;
}

/// Reads a module framed as `length || nonce || ciphertext [|| tag]` from the
/// input and decrypts it
pub fn read_and_decrypt<T: Read>(
    decryptor: &Arc<dyn BlockDecryptor>,
    input: &mut T,
    aad: &[u8],
) -> Result<Vec<u8>> {
    let mut len_bytes = [0; 4];
    input.read_exact(&mut len_bytes)?;
    let ciphertext_len = u32::from_le_bytes(len_bytes) as usize;
    let mut ciphertext = vec![0; 4 + ciphertext_len];
    ciphertext[0..4].copy_from_slice(&len_bytes);
    input.read_exact(&mut ciphertext[4..])?;

    decryptor.decrypt(&ciphertext, aad.as_ref())
}

/// Holds the context required to decrypt the modules of a column chunk
/// (data pages, dictionary pages, page headers, column and offset indexes)
#[derive(Clone, Debug)]
pub struct CryptoContext {
    pub(crate) row_group_ordinal: usize,
    pub(crate) column_ordinal: usize,
    pub(crate) page_ordinal: Option<usize>,
    pub(crate) dictionary_page: bool,
    // We have separate data and metadata decryptors because
    // in GCM CTR mode, the metadata and data pages use
    // different algorithms.
    data_decryptor: Arc<dyn BlockDecryptor>,
    metadata_decryptor: Arc<dyn BlockDecryptor>,
    file_aad: Vec<u8>,
}

impl CryptoContext {
    /// Create the decryption context for a column chunk, selecting the footer
    /// or column key according to the column's crypto metadata.
    ///
    /// When access to the column key is denied, the error is reported as
    /// [`EncryptionError::HiddenColumn`] so that readers can skip the column
    /// and still read the rest of the file.
    pub fn for_column(
        file_decryptor: &FileDecryptor,
        column_crypto_metadata: &ColumnCryptoMetaData,
        row_group_ordinal: usize,
        column_ordinal: usize,
    ) -> Result<Self> {
        let (data_decryptor, metadata_decryptor) = match column_crypto_metadata {
            ColumnCryptoMetaData::ENCRYPTION_WITH_FOOTER_KEY => {
                let data_decryptor = file_decryptor.get_footer_data_decryptor()?;
                let metadata_decryptor = file_decryptor.get_footer_decryptor()?;
                (data_decryptor, metadata_decryptor)
            }
            ColumnCryptoMetaData::ENCRYPTION_WITH_COLUMN_KEY(column_key_encryption) => {
                let key_metadata = &column_key_encryption.key_metadata;
                let column_name = column_key_encryption.path_in_schema.join(".");
                let data_decryptor = file_decryptor
                    .get_column_data_decryptor(&column_name, key_metadata.as_deref())
                    .map_err(|e| hide_column(&column_name, e))?;
                let metadata_decryptor = file_decryptor
                    .get_column_metadata_decryptor(&column_name, key_metadata.as_deref())
                    .map_err(|e| hide_column(&column_name, e))?;
                (data_decryptor, metadata_decryptor)
            }
        };

        Ok(CryptoContext {
            row_group_ordinal,
            column_ordinal,
            page_ordinal: None,
            dictionary_page: false,
            data_decryptor,
            metadata_decryptor,
            file_aad: file_decryptor.file_aad().clone(),
        })
    }

    /// The context for a data page with the given ordinal within the column chunk
    pub fn with_page_ordinal(&self, page_ordinal: usize) -> Self {
        Self {
            row_group_ordinal: self.row_group_ordinal,
            column_ordinal: self.column_ordinal,
            page_ordinal: Some(page_ordinal),
            dictionary_page: false,
            data_decryptor: self.data_decryptor.clone(),
            metadata_decryptor: self.metadata_decryptor.clone(),
            file_aad: self.file_aad.clone(),
        }
    }

    /// The context for the dictionary page of the column chunk
    pub fn for_dictionary_page(&self) -> Self {
        Self {
            row_group_ordinal: self.row_group_ordinal,
            column_ordinal: self.column_ordinal,
            page_ordinal: self.page_ordinal,
            dictionary_page: true,
            data_decryptor: self.data_decryptor.clone(),
            metadata_decryptor: self.metadata_decryptor.clone(),
            file_aad: self.file_aad.clone(),
        }
    }

    /// The AAD for the page header module at this context's ordinals
    pub fn create_page_header_aad(&self) -> Result<Vec<u8>> {
        let module_type = if self.dictionary_page {
            ModuleType::DictionaryPageHeader
        } else {
            ModuleType::DataPageHeader
        };

        create_module_aad(
            self.file_aad(),
            module_type,
            self.row_group_ordinal,
            self.column_ordinal,
            self.page_ordinal,
        )
    }

    /// The AAD for the page module at this context's ordinals
    pub fn create_page_aad(&self) -> Result<Vec<u8>> {
        let module_type = if self.dictionary_page {
            ModuleType::DictionaryPage
        } else {
            ModuleType::DataPage
        };

        create_module_aad(
            self.file_aad(),
            module_type,
            self.row_group_ordinal,
            self.column_ordinal,
            self.page_ordinal,
        )
    }

    /// The AAD for the column index module of this column chunk
    pub fn create_column_index_aad(&self) -> Result<Vec<u8>> {
        create_module_aad(
            self.file_aad(),
            ModuleType::ColumnIndex,
            self.row_group_ordinal,
            self.column_ordinal,
            None,
        )
    }

    /// The AAD for the offset index module of this column chunk
    pub fn create_offset_index_aad(&self) -> Result<Vec<u8>> {
        create_module_aad(
            self.file_aad(),
            ModuleType::OffsetIndex,
            self.row_group_ordinal,
            self.column_ordinal,
            None,
        )
    }

    /// The decryptor for page and page header modules
    pub fn data_decryptor(&self) -> &Arc<dyn BlockDecryptor> {
        &self.data_decryptor
    }

    /// The decryptor for metadata modules of this column chunk
    pub fn metadata_decryptor(&self) -> &Arc<dyn BlockDecryptor> {
        &self.metadata_decryptor
    }

    /// The AAD shared by all modules of this file
    pub fn file_aad(&self) -> &Vec<u8> {
        &self.file_aad
    }
}

/// Converts key access failures into the hidden-column outcome at the column
/// chunk boundary. Other errors are fatal and propagate unchanged.
fn hide_column(column_name: &str, error: EncryptionError) -> EncryptionError {
    match error {
        EncryptionError::KeyAccessDenied(message) => EncryptionError::HiddenColumn(format!(
            "Access to the key of column '{column_name}' was denied: {message}"
        )),
        other => other,
    }
}

#[derive(Clone, PartialEq)]
struct ExplicitDecryptionKeys {
    footer_key: Vec<u8>,
    column_keys: HashMap<String, Vec<u8>>,
}

impl Drop for ExplicitDecryptionKeys {
    fn drop(&mut self) {
        self.footer_key.zeroize();
        for key in self.column_keys.values_mut() {
            key.zeroize();
        }
    }
}

#[derive(Clone)]
enum DecryptionKeys {
    Explicit(ExplicitDecryptionKeys),
    ViaRetriever(Arc<dyn KeyRetriever>),
}

impl PartialEq for DecryptionKeys {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DecryptionKeys::Explicit(keys), DecryptionKeys::Explicit(other_keys)) => {
                keys == other_keys
            }
            (DecryptionKeys::ViaRetriever(_), DecryptionKeys::ViaRetriever(_)) => true,
            _ => false,
        }
    }
}

/// `FileDecryptionProperties` hold the keys and options required to decrypt
/// a Parquet file
#[derive(Clone)]
pub struct FileDecryptionProperties {
    keys: DecryptionKeys,
    aad_prefix: Option<Vec<u8>>,
    aad_prefix_verifier: Option<Arc<dyn AadPrefixVerifier>>,
    footer_signature_verification: bool,
}

impl PartialEq for FileDecryptionProperties {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
            && self.aad_prefix == other.aad_prefix
            && self.footer_signature_verification == other.footer_signature_verification
    }
}

impl FileDecryptionProperties {
    /// Returns a new [`FileDecryptionProperties`] builder that will use the
    /// provided key to decrypt footer metadata
    pub fn builder(footer_key: Vec<u8>) -> DecryptionPropertiesBuilder {
        DecryptionPropertiesBuilder::new(footer_key)
    }

    /// Returns a new [`FileDecryptionProperties`] builder that uses a
    /// [`KeyRetriever`] to get decryption keys based on key metadata
    pub fn with_key_retriever(
        key_retriever: Arc<dyn KeyRetriever>,
    ) -> DecryptionPropertiesBuilderWithRetriever {
        DecryptionPropertiesBuilderWithRetriever::new(key_retriever)
    }

    /// AAD prefix supplied by the reader, required for files that do not
    /// store their AAD prefix
    pub fn aad_prefix(&self) -> Option<&Vec<u8>> {
        self.aad_prefix.as_ref()
    }

    /// The verifier applied to AAD prefixes stored in files, if any
    pub fn aad_prefix_verifier(&self) -> Option<&Arc<dyn AadPrefixVerifier>> {
        self.aad_prefix_verifier.as_ref()
    }

    /// Returns true if footer signature verification is enabled for files
    /// with plaintext footers
    pub fn check_plaintext_footer_integrity(&self) -> bool {
        self.footer_signature_verification
    }

    /// Get the encryption key for decrypting a file's footer,
    /// and also column data if uniform encryption is used
    pub fn footer_key(&self, key_metadata: Option<&[u8]>) -> Result<Cow<'_, Vec<u8>>> {
        match &self.keys {
            DecryptionKeys::Explicit(keys) => Ok(Cow::Borrowed(&keys.footer_key)),
            DecryptionKeys::ViaRetriever(retriever) => {
                let key = retriever.retrieve_key(key_metadata.unwrap_or_default())?;
                Ok(Cow::Owned(key))
            }
        }
    }

    /// Get the column-specific key for decrypting column data and metadata
    pub fn column_key(
        &self,
        column_name: &str,
        key_metadata: Option<&[u8]>,
    ) -> Result<Cow<'_, Vec<u8>>> {
        match &self.keys {
            DecryptionKeys::Explicit(keys) => match keys.column_keys.get(column_name) {
                None => Err(EncryptionError::KeyAccessDenied(format!(
                    "No column decryption key set for encrypted column '{column_name}'"
                ))),
                Some(key) => Ok(Cow::Borrowed(key)),
            },
            DecryptionKeys::ViaRetriever(retriever) => {
                let key = retriever.retrieve_key(key_metadata.unwrap_or_default())?;
                Ok(Cow::Owned(key))
            }
        }
    }
}

impl std::fmt::Debug for FileDecryptionProperties {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileDecryptionProperties {{ }}")
    }
}

/// Builder for [`FileDecryptionProperties`] with explicitly provided keys
pub struct DecryptionPropertiesBuilder {
    footer_key: Vec<u8>,
    column_keys: HashMap<String, Vec<u8>>,
    aad_prefix: Option<Vec<u8>>,
    aad_prefix_verifier: Option<Arc<dyn AadPrefixVerifier>>,
    footer_signature_verification: bool,
}

impl DecryptionPropertiesBuilder {
    /// Create a new [`DecryptionPropertiesBuilder`] that will use the
    /// provided key to decrypt footer metadata
    pub fn new(footer_key: Vec<u8>) -> DecryptionPropertiesBuilder {
        Self {
            footer_key,
            column_keys: HashMap::default(),
            aad_prefix: None,
            aad_prefix_verifier: None,
            footer_signature_verification: true,
        }
    }

    /// Finalize the builder and return the created [`FileDecryptionProperties`]
    pub fn build(self) -> Result<Arc<FileDecryptionProperties>> {
        let keys = DecryptionKeys::Explicit(ExplicitDecryptionKeys {
            footer_key: self.footer_key,
            column_keys: self.column_keys,
        });
        Ok(Arc::new(FileDecryptionProperties {
            keys,
            aad_prefix: self.aad_prefix,
            aad_prefix_verifier: self.aad_prefix_verifier,
            footer_signature_verification: self.footer_signature_verification,
        }))
    }

    /// Specify the expected AAD prefix to be used for decryption.
    /// This must be set if the file was written with an AAD prefix and the
    /// prefix is not stored in the file metadata.
    pub fn with_aad_prefix(mut self, value: Vec<u8>) -> Self {
        self.aad_prefix = Some(value);
        self
    }

    /// Specify a verifier for AAD prefixes stored in files
    pub fn with_aad_prefix_verifier(mut self, verifier: Arc<dyn AadPrefixVerifier>) -> Self {
        self.aad_prefix_verifier = Some(verifier);
        self
    }

    /// Specify the decryption key to use for a column
    pub fn with_column_key(mut self, column_name: &str, decryption_key: Vec<u8>) -> Self {
        self.column_keys
            .insert(column_name.to_string(), decryption_key);
        self
    }

    /// Disable verification of footer tags for files that use plaintext
    /// footers. Signature verification is enabled by default.
    pub fn disable_footer_signature_verification(mut self) -> Self {
        self.footer_signature_verification = false;
        self
    }
}

/// Builder for [`FileDecryptionProperties`] that uses a [`KeyRetriever`]
pub struct DecryptionPropertiesBuilderWithRetriever {
    key_retriever: Arc<dyn KeyRetriever>,
    aad_prefix: Option<Vec<u8>>,
    aad_prefix_verifier: Option<Arc<dyn AadPrefixVerifier>>,
    footer_signature_verification: bool,
}

impl DecryptionPropertiesBuilderWithRetriever {
    /// Create a new [`DecryptionPropertiesBuilderWithRetriever`] by providing
    /// a [`KeyRetriever`] that can get decryption keys based on key metadata
    pub fn new(key_retriever: Arc<dyn KeyRetriever>) -> DecryptionPropertiesBuilderWithRetriever {
        Self {
            key_retriever,
            aad_prefix: None,
            aad_prefix_verifier: None,
            footer_signature_verification: true,
        }
    }

    /// Finalize the builder and return the created [`FileDecryptionProperties`]
    pub fn build(self) -> Result<Arc<FileDecryptionProperties>> {
        let keys = DecryptionKeys::ViaRetriever(self.key_retriever);
        Ok(Arc::new(FileDecryptionProperties {
            keys,
            aad_prefix: self.aad_prefix,
            aad_prefix_verifier: self.aad_prefix_verifier,
            footer_signature_verification: self.footer_signature_verification,
        }))
    }

    /// Specify the expected AAD prefix to be used for decryption
    pub fn with_aad_prefix(mut self, value: Vec<u8>) -> Self {
        self.aad_prefix = Some(value);
        self
    }

    /// Specify a verifier for AAD prefixes stored in files
    pub fn with_aad_prefix_verifier(mut self, verifier: Arc<dyn AadPrefixVerifier>) -> Self {
        self.aad_prefix_verifier = Some(verifier);
        self
    }

    /// Disable verification of footer tags for files that use plaintext
    /// footers. Signature verification is enabled by default.
    pub fn disable_footer_signature_verification(mut self) -> Self {
        self.footer_signature_verification = false;
        self
    }
}

/// Issues per-module decryptors for one file read operation
#[derive(Clone, Debug)]
pub struct FileDecryptor {
    decryption_properties: Arc<FileDecryptionProperties>,
    footer_decryptor: Arc<dyn BlockDecryptor>,
    footer_key: Zeroizing<Vec<u8>>,
    cipher: ParquetCipher,
    file_aad: Vec<u8>,
}

impl PartialEq for FileDecryptor {
    fn eq(&self, other: &Self) -> bool {
        self.decryption_properties == other.decryption_properties && self.file_aad == other.file_aad
    }
}

impl FileDecryptor {
    pub(crate) fn new(
        decryption_properties: &Arc<FileDecryptionProperties>,
        cipher: ParquetCipher,
        footer_key_metadata: Option<&[u8]>,
        aad_file_unique: Vec<u8>,
        aad_prefix: Vec<u8>,
    ) -> Result<Self> {
        let file_aad = [aad_prefix.as_slice(), aad_file_unique.as_slice()].concat();
        let footer_key =
            Zeroizing::new(decryption_properties.footer_key(footer_key_metadata)?.into_owned());
        let footer_decryptor = GcmBlockDecryptor::new(&footer_key)
            .map_err(|e| EncryptionError::Config(format!("Invalid footer key. {e}")))?;

        Ok(Self {
            footer_decryptor: Arc::new(footer_decryptor),
            decryption_properties: Arc::clone(decryption_properties),
            footer_key,
            cipher,
            file_aad,
        })
    }

    /// The decryptor for footer metadata and, with uniform encryption,
    /// column metadata modules
    pub fn get_footer_decryptor(&self) -> Result<Arc<dyn BlockDecryptor>> {
        Ok(self.footer_decryptor.clone())
    }

    /// The data-module decryptor bound to the footer key, used for columns
    /// encrypted with the footer key
    pub fn get_footer_data_decryptor(&self) -> Result<Arc<dyn BlockDecryptor>> {
        match self.cipher {
            ParquetCipher::AesGcmV1 => Ok(self.footer_decryptor.clone()),
            ParquetCipher::AesGcmCtrV1 => Ok(Arc::new(CtrBlockDecryptor::new(&self.footer_key)?)),
        }
    }

    /// Verify the signature of a plaintext footer
    pub fn verify_plaintext_footer_signature(&self, plaintext_footer: &[u8]) -> Result<()> {
        // Plaintext footer format is: [plaintext metadata, nonce, authentication tag]
        if plaintext_footer.len() < TAG_LEN {
            return Err(integrity_err!(
                "Plaintext footer is too short to hold a signature"
            ));
        }
        let tag = &plaintext_footer[plaintext_footer.len() - TAG_LEN..];
        let aad = create_footer_aad(self.file_aad())?;
        let footer_decryptor = self.get_footer_decryptor()?;

        let computed_tag = footer_decryptor.compute_plaintext_tag(&aad, plaintext_footer)?;

        if computed_tag != tag {
            return Err(integrity_err!(
                "Footer signature verification failed. Computed: {:?}, Expected: {:?}",
                computed_tag,
                tag
            ));
        }
        Ok(())
    }

    /// The decryptor for page and page header modules of a column
    pub fn get_column_data_decryptor(
        &self,
        column_name: &str,
        key_metadata: Option<&[u8]>,
    ) -> Result<Arc<dyn BlockDecryptor>> {
        let column_key = self
            .decryption_properties
            .column_key(column_name, key_metadata)?;
        match self.cipher {
            ParquetCipher::AesGcmV1 => Ok(Arc::new(GcmBlockDecryptor::new(&column_key)?)),
            ParquetCipher::AesGcmCtrV1 => Ok(Arc::new(CtrBlockDecryptor::new(&column_key)?)),
        }
    }

    /// The decryptor for metadata modules of a column, which use AES-GCM
    /// under both ciphers
    pub fn get_column_metadata_decryptor(
        &self,
        column_name: &str,
        key_metadata: Option<&[u8]>,
    ) -> Result<Arc<dyn BlockDecryptor>> {
        let column_key = self
            .decryption_properties
            .column_key(column_name, key_metadata)?;
        Ok(Arc::new(GcmBlockDecryptor::new(&column_key)?))
    }

    /// The AAD shared by all modules of this file
    pub fn file_aad(&self) -> &Vec<u8> {
        &self.file_aad
    }
}
