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

//! Column chunk crypto binding: building per-column crypto metadata and
//! encrypting and decrypting the `ColumnMetaData` Thrift blob.
//!
//! The serialized `ColumnMetaData` passes through as an opaque byte buffer;
//! key selection and AAD derivation happen here.

use crate::encryption::decrypt::FileDecryptor;
use crate::encryption::encrypt::FileEncryptor;
use crate::encryption::modules::{create_module_aad, ModuleType};
use crate::errors::{EncryptionError, Result};
use crate::format::{ColumnCryptoMetaData, EncryptionWithColumnKey};

/// The crypto metadata to store for a column chunk, or None when the column
/// is not encrypted
pub fn column_crypto_metadata(
    file_encryptor: &FileEncryptor,
    column_path: &str,
) -> Option<ColumnCryptoMetaData> {
    if !file_encryptor.is_column_encrypted(column_path) {
        return None;
    }
    match file_encryptor.properties().column_keys().get(column_path) {
        None => Some(ColumnCryptoMetaData::ENCRYPTION_WITH_FOOTER_KEY),
        Some(column_key) => Some(ColumnCryptoMetaData::ENCRYPTION_WITH_COLUMN_KEY(
            EncryptionWithColumnKey {
                path_in_schema: column_path.split('.').map(|s| s.to_owned()).collect(),
                key_metadata: column_key.key_metadata().cloned(),
            },
        )),
    }
}

/// Whether the metadata writer should keep a redacted plaintext copy of the
/// `ColumnMetaData` (statistics and encoding stats stripped) alongside the
/// encrypted blob. Only plaintext-footer files carry the redacted copy for
/// legacy readers; when the footer is encrypted the plaintext structure is
/// omitted entirely.
pub fn should_emit_redacted_column_metadata(encrypt_footer: bool) -> bool {
    !encrypt_footer
}

/// Encrypts the serialized `ColumnMetaData` of a column chunk with the
/// column's key (or the footer key under uniform encryption)
pub fn encrypt_column_metadata(
    file_encryptor: &FileEncryptor,
    column_path: &str,
    row_group_ordinal: usize,
    column_ordinal: usize,
    metadata: &[u8],
) -> Result<Vec<u8>> {
    let aad = create_module_aad(
        file_encryptor.file_aad(),
        ModuleType::ColumnMetaData,
        row_group_ordinal,
        column_ordinal,
        None,
    )?;
    let encryptor = file_encryptor.get_column_metadata_encryptor(column_path)?;
    encryptor.encrypt(metadata, &aad)
}

/// Decrypts the `encrypted_column_metadata` blob of a column chunk,
/// selecting the footer or column key according to the column's crypto
/// metadata.
///
/// When access to the column key is denied this returns
/// [`EncryptionError::HiddenColumn`]; readers skip the column and continue
/// with the rest of the file.
pub fn decrypt_column_metadata(
    file_decryptor: &FileDecryptor,
    column_crypto_metadata: &ColumnCryptoMetaData,
    row_group_ordinal: usize,
    column_ordinal: usize,
    encrypted_metadata: &[u8],
) -> Result<Vec<u8>> {
    let (column_name, decryptor) = match column_crypto_metadata {
        ColumnCryptoMetaData::ENCRYPTION_WITH_FOOTER_KEY => {
            (None, file_decryptor.get_footer_decryptor()?)
        }
        ColumnCryptoMetaData::ENCRYPTION_WITH_COLUMN_KEY(column_key_encryption) => {
            let column_name = column_key_encryption.path_in_schema.join(".");
            let decryptor = file_decryptor
                .get_column_metadata_decryptor(
                    &column_name,
                    column_key_encryption.key_metadata.as_deref(),
                )
                .map_err(|e| match e {
                    EncryptionError::KeyAccessDenied(message) => EncryptionError::HiddenColumn(
                        format!("Access to the key of column '{column_name}' was denied: {message}"),
                    ),
                    other => other,
                })?;
            (Some(column_name), decryptor)
        }
    };

    let aad = create_module_aad(
        file_decryptor.file_aad(),
        ModuleType::ColumnMetaData,
        row_group_ordinal,
        column_ordinal,
        None,
    )?;

    decryptor.decrypt(encrypted_metadata, &aad).map_err(|_| {
        let column = column_name.unwrap_or_else(|| "<footer key column>".to_owned());
        crypto_err!(
            "Unable to decrypt column '{}', perhaps the column key is wrong?",
            column
        )
    })
}
