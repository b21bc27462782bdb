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

//! Writing and reading of encrypted and signed-plaintext Parquet footers.
//!
//! The serialized `FileMetaData` Thrift structure passes through this module
//! as an opaque byte buffer. Only the crypto metadata that frames it is
//! interpreted here.
//!
//! # Layout of the footer region
//!
//! Encrypted footer:
//! ```text
//! | FileCryptoMetaData | encrypted FileMetaData | len (4 LE) | 'PARE' |
//! ```
//!
//! Signed plaintext footer:
//! ```text
//! | FileMetaData | nonce (12) | tag (16) | len (4 LE) | 'PAR1' |
//! ```

use crate::encryption::decrypt::{FileDecryptionProperties, FileDecryptor};
use crate::encryption::encrypt::FileEncryptor;
use crate::encryption::modules::create_footer_aad;
use crate::encryption::{AlgorithmAad, ParquetCipher};
use crate::errors::{EncryptionError, Result};
use crate::file::{FOOTER_SIZE, PARQUET_MAGIC, PARQUET_MAGIC_ENCR_FOOTER};
use crate::format::{self, EncryptionAlgorithm, FileCryptoMetaData};
use std::io::Write;
use std::sync::Arc;

/// The decoded 8-byte Parquet file trailer
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FooterTail {
    metadata_length: usize,
    encrypted_footer: bool,
}

impl FooterTail {
    /// Decode the trailing 8 bytes of a Parquet file
    pub fn try_new(footer: &[u8; FOOTER_SIZE]) -> Result<Self> {
        let encrypted_footer = if footer[4..] == PARQUET_MAGIC {
            false
        } else if footer[4..] == PARQUET_MAGIC_ENCR_FOOTER {
            true
        } else {
            return Err(metadata_err!("Invalid Parquet file. Corrupt footer"));
        };
        let metadata_len = u32::from_le_bytes(footer[..4].try_into().unwrap());
        Ok(Self {
            metadata_length: metadata_len as usize,
            encrypted_footer,
        })
    }

    /// The length of the footer region preceding the trailer.
    /// For encrypted footers this covers the crypto metadata and the
    /// footer ciphertext; for signed plaintext footers it covers the
    /// metadata and its 28-byte signature.
    pub fn metadata_length(&self) -> usize {
        self.metadata_length
    }

    /// Whether the footer is encrypted
    pub fn is_encrypted_footer(&self) -> bool {
        self.encrypted_footer
    }
}

/// Encrypts the serialized footer and writes the footer region including the
/// trailer: `FileCryptoMetaData || ciphertext || len || PARE`
pub fn write_encrypted_footer<W: Write>(
    sink: &mut W,
    metadata: &[u8],
    file_encryptor: &FileEncryptor,
) -> Result<()> {
    let properties = file_encryptor.properties();
    if !properties.encrypt_footer() {
        return Err(config_err!(
            "Cannot write an encrypted footer with plaintext footer properties"
        ));
    }

    let crypto_metadata = FileCryptoMetaData {
        encryption_algorithm: properties.encryption_algorithm(),
        key_metadata: properties.footer_key_metadata().cloned(),
    };
    let crypto_metadata = format::to_thrift_bytes(&crypto_metadata)?;

    let aad = create_footer_aad(file_encryptor.file_aad())?;
    let encrypted_metadata = file_encryptor.get_footer_encryptor()?.encrypt(metadata, &aad)?;

    let footer_len = crypto_metadata.len() + encrypted_metadata.len();
    sink.write_all(&crypto_metadata)?;
    sink.write_all(&encrypted_metadata)?;
    sink.write_all(&(footer_len as u32).to_le_bytes())?;
    sink.write_all(&PARQUET_MAGIC_ENCR_FOOTER)?;
    Ok(())
}

/// Signs the serialized footer and writes the footer region including the
/// trailer: `metadata || nonce || tag || len || PAR1`.
///
/// The metadata must already carry the encryption algorithm record and the
/// footer signing key metadata, so that readers can locate the signing key.
pub fn write_signed_plaintext_footer<W: Write>(
    sink: &mut W,
    metadata: &[u8],
    file_encryptor: &FileEncryptor,
) -> Result<()> {
    let properties = file_encryptor.properties();
    if properties.encrypt_footer() {
        return Err(config_err!(
            "Cannot write a signed plaintext footer with encrypted footer properties"
        ));
    }

    let aad = create_footer_aad(file_encryptor.file_aad())?;
    let signature = file_encryptor
        .get_footer_signing_encryptor()?
        .sign(metadata, &aad)?;

    let footer_len = metadata.len() + signature.len();
    sink.write_all(metadata)?;
    sink.write_all(&signature)?;
    sink.write_all(&(footer_len as u32).to_le_bytes())?;
    sink.write_all(&PARQUET_MAGIC)?;
    Ok(())
}

/// Decrypts an encrypted footer region (without its trailer), returning the
/// plaintext `FileMetaData` bytes and the file decryptor used for the rest
/// of the file
pub fn read_encrypted_footer(
    footer: &[u8],
    decryption_properties: &Arc<FileDecryptionProperties>,
) -> Result<(Vec<u8>, FileDecryptor)> {
    let (crypto_metadata, consumed) = format::from_thrift_bytes::<FileCryptoMetaData>(footer)
        .map_err(|e| metadata_err!("Could not parse crypto metadata: {}", e))?;
    let encrypted_metadata = &footer[consumed..];

    let decryptor = get_file_decryptor(
        &crypto_metadata.encryption_algorithm,
        crypto_metadata.key_metadata.as_deref(),
        decryption_properties,
    )?;

    let footer_decryptor = decryptor.get_footer_decryptor()?;
    let aad = create_footer_aad(decryptor.file_aad())?;

    let metadata = footer_decryptor
        .decrypt(encrypted_metadata, &aad)
        .map_err(|_| {
            crypto_err!("Provided footer key and AAD were unable to decrypt parquet footer")
        })?;

    Ok((metadata, decryptor))
}

/// Builds the file decryptor for a plaintext-footer file from the algorithm
/// record stored inside its `FileMetaData`, verifying the footer signature
/// unless disabled.
///
/// `footer` is the complete footer region without its trailer:
/// the serialized metadata followed by the 28-byte signature.
pub fn read_signed_plaintext_footer(
    footer: &[u8],
    encryption_algorithm: &EncryptionAlgorithm,
    footer_signing_key_metadata: Option<&[u8]>,
    decryption_properties: &Arc<FileDecryptionProperties>,
) -> Result<FileDecryptor> {
    let decryptor = get_file_decryptor(
        encryption_algorithm,
        footer_signing_key_metadata,
        decryption_properties,
    )?;

    if decryption_properties.check_plaintext_footer_integrity() {
        decryptor.verify_plaintext_footer_signature(footer)?;
    }

    Ok(decryptor)
}

/// Builds a [`FileDecryptor`] from a file's algorithm record and footer key
/// metadata, enforcing the AAD prefix rules
pub fn get_file_decryptor(
    encryption_algorithm: &EncryptionAlgorithm,
    footer_key_metadata: Option<&[u8]>,
    decryption_properties: &Arc<FileDecryptionProperties>,
) -> Result<FileDecryptor> {
    let cipher = ParquetCipher::from_thrift(encryption_algorithm)?;
    let aad = AlgorithmAad::try_new(encryption_algorithm)?;

    let aad_file_unique = aad
        .aad_file_unique
        .ok_or_else(|| metadata_err!("AAD unique file identifier is not set"))?;
    if aad.supply_aad_prefix && decryption_properties.aad_prefix().is_none() {
        return Err(config_err!(
            "Parquet file was encrypted with an AAD prefix that is not stored in the file, \
             but no AAD prefix was provided in the file decryption properties"
        ));
    }

    let aad_prefix = if let Some(aad_prefix) = decryption_properties.aad_prefix() {
        aad_prefix.clone()
    } else {
        match aad.aad_prefix {
            Some(stored_prefix) => {
                // An AAD prefix taken from the file is only trusted after the
                // application's verifier accepts it
                if let Some(verifier) = decryption_properties.aad_prefix_verifier() {
                    verifier.verify(stored_prefix)?;
                }
                stored_prefix.clone()
            }
            None => Vec::new(),
        }
    };

    FileDecryptor::new(
        decryption_properties,
        cipher,
        footer_key_metadata,
        aad_file_unique.clone(),
        aad_prefix,
    )
}
