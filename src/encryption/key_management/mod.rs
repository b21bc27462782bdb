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

//! Encryption key management tools for Parquet.
//!
//! Envelope encryption is used, where files are encrypted with data
//! encryption keys (DEKs) that are randomly generated per file, and the DEKs
//! are encrypted with master encryption keys that are managed by a Key
//! Management Server (KMS). Double wrapping is used by default, where the
//! DEKs are first encrypted with key encryption keys (KEKs) that are in turn
//! encrypted with master keys, to reduce KMS interactions.
//!
//! Using this module requires defining your own type that implements the
//! [`KmsClient`](kms::KmsClient) trait and interacts with your
//! organization's KMS. The [`CryptoFactory`](crypto_factory::CryptoFactory)
//! then generates
//! [`FileEncryptionProperties`](crate::encryption::encrypt::FileEncryptionProperties)
//! for writing encrypted files and
//! [`FileDecryptionProperties`](crate::encryption::decrypt::FileDecryptionProperties)
//! for reading them.
//!
//! # Example
//! ```
//! use parquet_crypto::encryption::key_management::crypto_factory::{
//!     CryptoFactory, DecryptionConfiguration, EncryptionConfigurationBuilder,
//! };
//! use parquet_crypto::encryption::key_management::kms::KmsConnectionConfig;
//! use parquet_crypto::encryption::key_management::test_kms::TestKmsClientFactory;
//! use std::sync::Arc;
//!
//! # fn main() -> parquet_crypto::errors::Result<()> {
//! // A real application provides a factory creating clients for its own KMS
//! let crypto_factory = CryptoFactory::new(TestKmsClientFactory::with_default_keys());
//! let connection_config = Arc::new(KmsConnectionConfig::default());
//!
//! // Encrypt the footer with the "kf" master key and the "x" column with
//! // the "kc1" master key, leaving other columns in plaintext
//! let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
//!     .add_column_key("kc1".to_owned(), vec!["x".to_owned()])
//!     .build()?;
//! let encryption_properties = crypto_factory
//!     .file_encryption_properties(connection_config.clone(), &encryption_config)?;
//!
//! // Key metadata stored in the file lets readers find the right keys,
//! // so the decryption side only needs KMS access
//! let decryption_properties = crypto_factory
//!     .file_decryption_properties(connection_config, DecryptionConfiguration::default())?;
//! # Ok(())
//! # }
//! ```

pub mod crypto_factory;
mod key_encryption;
pub mod key_material;
mod key_unwrapper;
mod key_wrapper;
pub mod kms;
mod kms_manager;
pub mod test_kms;
