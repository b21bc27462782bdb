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

//! Parquet Modular Encryption: per-module AES ciphers, file encryptors and
//! decryptors, and the key management tools that drive them

use crate::errors::{EncryptionError, Result};
use crate::format;

pub mod ciphers;
pub mod decrypt;
pub mod encrypt;
pub mod key_management;
pub mod modules;

/// Parquet modular encryption ciphers
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ParquetCipher {
    /// AES-GCM version 1, where all metadata and data pages are encrypted with AES-GCM
    #[default]
    AesGcmV1,
    /// AES-GCM-CTR version 1, where metadata is encrypted with AES-GCM, and data pages
    /// are encrypted with AES-CTR
    AesGcmCtrV1,
}

impl ParquetCipher {
    /// Build the thrift algorithm record stored in the file
    pub(crate) fn to_thrift(
        self,
        aad_prefix: Option<Vec<u8>>,
        aad_file_unique: Vec<u8>,
        supply_aad_prefix: Option<bool>,
    ) -> format::EncryptionAlgorithm {
        match self {
            ParquetCipher::AesGcmV1 => format::EncryptionAlgorithm::AES_GCM_V1(format::AesGcmV1 {
                aad_prefix,
                aad_file_unique: Some(aad_file_unique),
                supply_aad_prefix,
            }),
            ParquetCipher::AesGcmCtrV1 => {
                format::EncryptionAlgorithm::AES_GCM_CTR_V1(format::AesGcmCtrV1 {
                    aad_prefix,
                    aad_file_unique: Some(aad_file_unique),
                    supply_aad_prefix,
                })
            }
        }
    }

    pub(crate) fn from_thrift(algorithm: &format::EncryptionAlgorithm) -> Result<Self> {
        match algorithm {
            format::EncryptionAlgorithm::AES_GCM_V1(_) => Ok(ParquetCipher::AesGcmV1),
            format::EncryptionAlgorithm::AES_GCM_CTR_V1(_) => Ok(ParquetCipher::AesGcmCtrV1),
        }
    }
}

/// The AAD parameters of the thrift algorithm record, common to both ciphers
pub(crate) struct AlgorithmAad<'a> {
    pub aad_prefix: Option<&'a Vec<u8>>,
    pub aad_file_unique: Option<&'a Vec<u8>>,
    pub supply_aad_prefix: bool,
}

impl<'a> AlgorithmAad<'a> {
    pub(crate) fn try_new(algorithm: &'a format::EncryptionAlgorithm) -> Result<Self> {
        match algorithm {
            format::EncryptionAlgorithm::AES_GCM_V1(algo) => Ok(Self {
                aad_prefix: algo.aad_prefix.as_ref(),
                aad_file_unique: algo.aad_file_unique.as_ref(),
                supply_aad_prefix: algo.supply_aad_prefix.unwrap_or(false),
            }),
            format::EncryptionAlgorithm::AES_GCM_CTR_V1(algo) => Ok(Self {
                aad_prefix: algo.aad_prefix.as_ref(),
                aad_file_unique: algo.aad_file_unique.as_ref(),
                supply_aad_prefix: algo.supply_aad_prefix.unwrap_or(false),
            }),
        }
    }
}

impl std::fmt::Display for ParquetCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParquetCipher::AesGcmV1 => write!(f, "AES_GCM_V1"),
            ParquetCipher::AesGcmCtrV1 => write!(f, "AES_GCM_CTR_V1"),
        }
    }
}

impl std::str::FromStr for ParquetCipher {
    type Err = EncryptionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AES_GCM_V1" => Ok(ParquetCipher::AesGcmV1),
            "AES_GCM_CTR_V1" => Ok(ParquetCipher::AesGcmCtrV1),
            _ => Err(EncryptionError::UnsupportedAlgorithm(s.to_owned())),
        }
    }
}
