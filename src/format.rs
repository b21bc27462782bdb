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

//! Thrift definitions for the encryption-related parts of the Parquet format.
//!
//! Only the structures that the crypto layer owns are defined here: the
//! encryption algorithm records, the crypto metadata that precedes an
//! encrypted footer, and the per-column-chunk crypto metadata. The main
//! `FileMetaData` and `ColumnMetaData` structures are serialized elsewhere
//! and pass through this crate as opaque byte buffers.

use crate::errors::Result;
use thrift::protocol::{
    field_id, TCompactInputProtocol, TCompactOutputProtocol, TFieldIdentifier, TInputProtocol,
    TListIdentifier, TOutputProtocol, TSerializable, TStructIdentifier, TType,
};
use thrift::{ProtocolError, ProtocolErrorKind};

/// Parameters of the AES-GCM-V1 algorithm, where all modules are
/// encrypted and authenticated with AES-GCM.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AesGcmV1 {
    /// AAD prefix, stored only when the writer chose to persist it
    pub aad_prefix: Option<Vec<u8>>,
    /// Unique file identifier part of the AAD suffix
    pub aad_file_unique: Option<Vec<u8>>,
    /// In files encrypted with an AAD prefix without storing it,
    /// readers must supply the prefix
    pub supply_aad_prefix: Option<bool>,
}

/// Parameters of the AES-GCM-CTR-V1 algorithm, where metadata modules are
/// encrypted with AES-GCM and data pages are encrypted with AES-CTR.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AesGcmCtrV1 {
    /// AAD prefix, stored only when the writer chose to persist it
    pub aad_prefix: Option<Vec<u8>>,
    /// Unique file identifier part of the AAD suffix
    pub aad_file_unique: Option<Vec<u8>>,
    /// In files encrypted with an AAD prefix without storing it,
    /// readers must supply the prefix
    pub supply_aad_prefix: Option<bool>,
}

fn read_aes_gcm_fields(
    i_prot: &mut dyn TInputProtocol,
) -> thrift::Result<(Option<Vec<u8>>, Option<Vec<u8>>, Option<bool>)> {
    i_prot.read_struct_begin()?;
    let mut aad_prefix: Option<Vec<u8>> = None;
    let mut aad_file_unique: Option<Vec<u8>> = None;
    let mut supply_aad_prefix: Option<bool> = None;
    loop {
        let field_ident = i_prot.read_field_begin()?;
        if field_ident.field_type == TType::Stop {
            break;
        }
        let field_id = field_id(&field_ident)?;
        match field_id {
            1 => {
                aad_prefix = Some(i_prot.read_bytes()?);
            }
            2 => {
                aad_file_unique = Some(i_prot.read_bytes()?);
            }
            3 => {
                supply_aad_prefix = Some(i_prot.read_bool()?);
            }
            _ => {
                i_prot.skip(field_ident.field_type)?;
            }
        };
        i_prot.read_field_end()?;
    }
    i_prot.read_struct_end()?;
    Ok((aad_prefix, aad_file_unique, supply_aad_prefix))
}

fn write_aes_gcm_fields(
    o_prot: &mut dyn TOutputProtocol,
    struct_name: &'static str,
    aad_prefix: &Option<Vec<u8>>,
    aad_file_unique: &Option<Vec<u8>>,
    supply_aad_prefix: &Option<bool>,
) -> thrift::Result<()> {
    o_prot.write_struct_begin(&TStructIdentifier::new(struct_name))?;
    if let Some(fld_var) = aad_prefix {
        o_prot.write_field_begin(&TFieldIdentifier::new("aad_prefix", TType::String, 1))?;
        o_prot.write_bytes(fld_var)?;
        o_prot.write_field_end()?;
    }
    if let Some(fld_var) = aad_file_unique {
        o_prot.write_field_begin(&TFieldIdentifier::new("aad_file_unique", TType::String, 2))?;
        o_prot.write_bytes(fld_var)?;
        o_prot.write_field_end()?;
    }
    if let Some(fld_var) = supply_aad_prefix {
        o_prot.write_field_begin(&TFieldIdentifier::new("supply_aad_prefix", TType::Bool, 3))?;
        o_prot.write_bool(*fld_var)?;
        o_prot.write_field_end()?;
    }
    o_prot.write_field_stop()?;
    o_prot.write_struct_end()
}

impl TSerializable for AesGcmV1 {
    fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<AesGcmV1> {
        let (aad_prefix, aad_file_unique, supply_aad_prefix) = read_aes_gcm_fields(i_prot)?;
        Ok(AesGcmV1 {
            aad_prefix,
            aad_file_unique,
            supply_aad_prefix,
        })
    }
    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        write_aes_gcm_fields(
            o_prot,
            "AesGcmV1",
            &self.aad_prefix,
            &self.aad_file_unique,
            &self.supply_aad_prefix,
        )
    }
}

impl TSerializable for AesGcmCtrV1 {
    fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<AesGcmCtrV1> {
        let (aad_prefix, aad_file_unique, supply_aad_prefix) = read_aes_gcm_fields(i_prot)?;
        Ok(AesGcmCtrV1 {
            aad_prefix,
            aad_file_unique,
            supply_aad_prefix,
        })
    }
    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        write_aes_gcm_fields(
            o_prot,
            "AesGcmCtrV1",
            &self.aad_prefix,
            &self.aad_file_unique,
            &self.supply_aad_prefix,
        )
    }
}

/// The encryption algorithm record stored in `FileCryptoMetaData`
/// (encrypted footer) or inside `FileMetaData` (plaintext footer).
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(non_camel_case_types)]
pub enum EncryptionAlgorithm {
    /// All modules encrypted and authenticated with AES-GCM
    AES_GCM_V1(AesGcmV1),
    /// Metadata modules encrypted with AES-GCM, data pages with AES-CTR
    AES_GCM_CTR_V1(AesGcmCtrV1),
}

impl TSerializable for EncryptionAlgorithm {
    fn read_from_in_protocol(
        i_prot: &mut dyn TInputProtocol,
    ) -> thrift::Result<EncryptionAlgorithm> {
        let mut ret: Option<EncryptionAlgorithm> = None;
        let mut received_field_count = 0;
        i_prot.read_struct_begin()?;
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            let field_id = field_id(&field_ident)?;
            match field_id {
                1 => {
                    let val = AesGcmV1::read_from_in_protocol(i_prot)?;
                    if ret.is_none() {
                        ret = Some(EncryptionAlgorithm::AES_GCM_V1(val));
                    }
                    received_field_count += 1;
                }
                2 => {
                    let val = AesGcmCtrV1::read_from_in_protocol(i_prot)?;
                    if ret.is_none() {
                        ret = Some(EncryptionAlgorithm::AES_GCM_CTR_V1(val));
                    }
                    received_field_count += 1;
                }
                _ => {
                    i_prot.skip(field_ident.field_type)?;
                    received_field_count += 1;
                }
            };
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        if received_field_count == 0 {
            Err(thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                "received empty union from remote EncryptionAlgorithm",
            )))
        } else if received_field_count > 1 {
            Err(thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                "received multiple fields for union from remote EncryptionAlgorithm",
            )))
        } else {
            ret.ok_or_else(|| {
                thrift::Error::Protocol(ProtocolError::new(
                    ProtocolErrorKind::InvalidData,
                    "return value should have been constructed",
                ))
            })
        }
    }
    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("EncryptionAlgorithm"))?;
        match self {
            EncryptionAlgorithm::AES_GCM_V1(f) => {
                o_prot.write_field_begin(&TFieldIdentifier::new("AES_GCM_V1", TType::Struct, 1))?;
                f.write_to_out_protocol(o_prot)?;
                o_prot.write_field_end()?;
            }
            EncryptionAlgorithm::AES_GCM_CTR_V1(f) => {
                o_prot.write_field_begin(&TFieldIdentifier::new(
                    "AES_GCM_CTR_V1",
                    TType::Struct,
                    2,
                ))?;
                f.write_to_out_protocol(o_prot)?;
                o_prot.write_field_end()?;
            }
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

/// Crypto metadata stored unencrypted at the start of the footer region of
/// files with an encrypted footer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileCryptoMetaData {
    /// Encryption algorithm. This field is only used for files with an
    /// encrypted footer. Files with a plaintext footer store the algorithm
    /// record inside the footer itself.
    pub encryption_algorithm: EncryptionAlgorithm,
    /// Retrieval metadata of the key used for encryption of the footer,
    /// and (possibly) columns.
    pub key_metadata: Option<Vec<u8>>,
}

impl TSerializable for FileCryptoMetaData {
    fn read_from_in_protocol(i_prot: &mut dyn TInputProtocol) -> thrift::Result<FileCryptoMetaData> {
        i_prot.read_struct_begin()?;
        let mut encryption_algorithm: Option<EncryptionAlgorithm> = None;
        let mut key_metadata: Option<Vec<u8>> = None;
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            let field_id = field_id(&field_ident)?;
            match field_id {
                1 => {
                    encryption_algorithm =
                        Some(EncryptionAlgorithm::read_from_in_protocol(i_prot)?);
                }
                2 => {
                    key_metadata = Some(i_prot.read_bytes()?);
                }
                _ => {
                    i_prot.skip(field_ident.field_type)?;
                }
            };
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        let encryption_algorithm = encryption_algorithm.ok_or_else(|| {
            thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                "missing required field FileCryptoMetaData.encryption_algorithm",
            ))
        })?;
        Ok(FileCryptoMetaData {
            encryption_algorithm,
            key_metadata,
        })
    }
    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("FileCryptoMetaData"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new(
            "encryption_algorithm",
            TType::Struct,
            1,
        ))?;
        self.encryption_algorithm.write_to_out_protocol(o_prot)?;
        o_prot.write_field_end()?;
        if let Some(ref fld_var) = self.key_metadata {
            o_prot.write_field_begin(&TFieldIdentifier::new("key_metadata", TType::String, 2))?;
            o_prot.write_bytes(fld_var)?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

/// Encryption metadata for a column chunk encrypted with a column-specific key
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptionWithColumnKey {
    /// Path to the column in the Parquet schema
    pub path_in_schema: Vec<String>,
    /// Retrieval metadata of the column encryption key
    pub key_metadata: Option<Vec<u8>>,
}

impl TSerializable for EncryptionWithColumnKey {
    fn read_from_in_protocol(
        i_prot: &mut dyn TInputProtocol,
    ) -> thrift::Result<EncryptionWithColumnKey> {
        i_prot.read_struct_begin()?;
        let mut path_in_schema: Option<Vec<String>> = None;
        let mut key_metadata: Option<Vec<u8>> = None;
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            let field_id = field_id(&field_ident)?;
            match field_id {
                1 => {
                    let list_ident = i_prot.read_list_begin()?;
                    let mut val: Vec<String> = Vec::with_capacity(list_ident.size as usize);
                    for _ in 0..list_ident.size {
                        val.push(i_prot.read_string()?);
                    }
                    i_prot.read_list_end()?;
                    path_in_schema = Some(val);
                }
                2 => {
                    key_metadata = Some(i_prot.read_bytes()?);
                }
                _ => {
                    i_prot.skip(field_ident.field_type)?;
                }
            };
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        let path_in_schema = path_in_schema.ok_or_else(|| {
            thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                "missing required field EncryptionWithColumnKey.path_in_schema",
            ))
        })?;
        Ok(EncryptionWithColumnKey {
            path_in_schema,
            key_metadata,
        })
    }
    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("EncryptionWithColumnKey"))?;
        o_prot.write_field_begin(&TFieldIdentifier::new("path_in_schema", TType::List, 1))?;
        o_prot.write_list_begin(&TListIdentifier::new(
            TType::String,
            self.path_in_schema.len() as i32,
        ))?;
        for e in &self.path_in_schema {
            o_prot.write_string(e)?;
        }
        o_prot.write_list_end()?;
        o_prot.write_field_end()?;
        if let Some(ref fld_var) = self.key_metadata {
            o_prot.write_field_begin(&TFieldIdentifier::new("key_metadata", TType::String, 2))?;
            o_prot.write_bytes(fld_var)?;
            o_prot.write_field_end()?;
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

/// Crypto metadata for a column chunk
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(non_camel_case_types)]
pub enum ColumnCryptoMetaData {
    /// The column is encrypted with the footer key
    ENCRYPTION_WITH_FOOTER_KEY,
    /// The column is encrypted with a column-specific key
    ENCRYPTION_WITH_COLUMN_KEY(EncryptionWithColumnKey),
}

impl TSerializable for ColumnCryptoMetaData {
    fn read_from_in_protocol(
        i_prot: &mut dyn TInputProtocol,
    ) -> thrift::Result<ColumnCryptoMetaData> {
        let mut ret: Option<ColumnCryptoMetaData> = None;
        let mut received_field_count = 0;
        i_prot.read_struct_begin()?;
        loop {
            let field_ident = i_prot.read_field_begin()?;
            if field_ident.field_type == TType::Stop {
                break;
            }
            let field_id = field_id(&field_ident)?;
            match field_id {
                1 => {
                    // EncryptionWithFooterKey is an empty struct
                    i_prot.read_struct_begin()?;
                    loop {
                        let inner = i_prot.read_field_begin()?;
                        if inner.field_type == TType::Stop {
                            break;
                        }
                        i_prot.skip(inner.field_type)?;
                        i_prot.read_field_end()?;
                    }
                    i_prot.read_struct_end()?;
                    if ret.is_none() {
                        ret = Some(ColumnCryptoMetaData::ENCRYPTION_WITH_FOOTER_KEY);
                    }
                    received_field_count += 1;
                }
                2 => {
                    let val = EncryptionWithColumnKey::read_from_in_protocol(i_prot)?;
                    if ret.is_none() {
                        ret = Some(ColumnCryptoMetaData::ENCRYPTION_WITH_COLUMN_KEY(val));
                    }
                    received_field_count += 1;
                }
                _ => {
                    i_prot.skip(field_ident.field_type)?;
                    received_field_count += 1;
                }
            };
            i_prot.read_field_end()?;
        }
        i_prot.read_struct_end()?;
        if received_field_count == 0 {
            Err(thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                "received empty union from remote ColumnCryptoMetaData",
            )))
        } else if received_field_count > 1 {
            Err(thrift::Error::Protocol(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                "received multiple fields for union from remote ColumnCryptoMetaData",
            )))
        } else {
            ret.ok_or_else(|| {
                thrift::Error::Protocol(ProtocolError::new(
                    ProtocolErrorKind::InvalidData,
                    "return value should have been constructed",
                ))
            })
        }
    }
    fn write_to_out_protocol(&self, o_prot: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o_prot.write_struct_begin(&TStructIdentifier::new("ColumnCryptoMetaData"))?;
        match self {
            ColumnCryptoMetaData::ENCRYPTION_WITH_FOOTER_KEY => {
                o_prot.write_field_begin(&TFieldIdentifier::new(
                    "ENCRYPTION_WITH_FOOTER_KEY",
                    TType::Struct,
                    1,
                ))?;
                o_prot.write_struct_begin(&TStructIdentifier::new("EncryptionWithFooterKey"))?;
                o_prot.write_field_stop()?;
                o_prot.write_struct_end()?;
                o_prot.write_field_end()?;
            }
            ColumnCryptoMetaData::ENCRYPTION_WITH_COLUMN_KEY(f) => {
                o_prot.write_field_begin(&TFieldIdentifier::new(
                    "ENCRYPTION_WITH_COLUMN_KEY",
                    TType::Struct,
                    2,
                ))?;
                f.write_to_out_protocol(o_prot)?;
                o_prot.write_field_end()?;
            }
        }
        o_prot.write_field_stop()?;
        o_prot.write_struct_end()
    }
}

/// Serializes a thrift object into the compact protocol byte representation
pub fn to_thrift_bytes<T: TSerializable>(object: &T) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut protocol = TCompactOutputProtocol::new(&mut buffer);
        object.write_to_out_protocol(&mut protocol)?;
    }
    Ok(buffer)
}

/// Deserializes a thrift object from compact protocol bytes, returning the
/// object and the number of bytes consumed
pub fn from_thrift_bytes<T: TSerializable>(bytes: &[u8]) -> Result<(T, usize)> {
    let mut reader = bytes;
    let object = {
        let mut protocol = TCompactInputProtocol::new(&mut reader);
        T::read_from_in_protocol(&mut protocol)?
    };
    Ok((object, bytes.len() - reader.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_crypto_metadata_round_trip() {
        let metadata = FileCryptoMetaData {
            encryption_algorithm: EncryptionAlgorithm::AES_GCM_V1(AesGcmV1 {
                aad_prefix: Some(b"prefix".to_vec()),
                aad_file_unique: Some(vec![0, 1, 2, 3, 4, 5, 6, 7]),
                supply_aad_prefix: Some(false),
            }),
            key_metadata: Some(b"key-metadata".to_vec()),
        };

        let bytes = to_thrift_bytes(&metadata).unwrap();
        let (decoded, consumed) = from_thrift_bytes::<FileCryptoMetaData>(&bytes).unwrap();

        assert_eq!(decoded, metadata);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_gcm_ctr_algorithm_round_trip() {
        let algorithm = EncryptionAlgorithm::AES_GCM_CTR_V1(AesGcmCtrV1 {
            aad_prefix: None,
            aad_file_unique: Some(vec![9; 8]),
            supply_aad_prefix: Some(true),
        });

        let bytes = to_thrift_bytes(&algorithm).unwrap();
        let (decoded, _) = from_thrift_bytes::<EncryptionAlgorithm>(&bytes).unwrap();

        assert_eq!(decoded, algorithm);
    }

    #[test]
    fn test_encryption_with_footer_key_round_trip() {
        let metadata = ColumnCryptoMetaData::ENCRYPTION_WITH_FOOTER_KEY;

        let bytes = to_thrift_bytes(&metadata).unwrap();
        let (decoded, _) = from_thrift_bytes::<ColumnCryptoMetaData>(&bytes).unwrap();

        assert_eq!(decoded, metadata);
    }

    #[test]
    fn test_encryption_with_column_key_round_trip() {
        let metadata = ColumnCryptoMetaData::ENCRYPTION_WITH_COLUMN_KEY(EncryptionWithColumnKey {
            path_in_schema: vec!["abc".to_owned(), "def".to_owned()],
            key_metadata: Some(vec![0, 1, 2, 3, 4, 5]),
        });

        let bytes = to_thrift_bytes(&metadata).unwrap();
        let (decoded, _) = from_thrift_bytes::<ColumnCryptoMetaData>(&bytes).unwrap();

        assert_eq!(decoded, metadata);
    }

    #[test]
    fn test_empty_union_rejected() {
        // A struct with no fields set is not a valid union value
        let bytes = vec![0u8];
        let result = from_thrift_bytes::<EncryptionAlgorithm>(&bytes);
        assert!(result.is_err());
    }
}
