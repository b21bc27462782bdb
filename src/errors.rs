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

//! Common encryption errors and macros.

use std::error::Error;
use std::{io, result, str};

/// Encryption error enumeration
#[derive(Debug)]
pub enum EncryptionError {
    /// Invalid configuration, such as mutually exclusive options being set
    /// together, empty required fields, or an unsupported key length.
    Config(String),
    /// The JSON key material or key metadata stored in a file could not be parsed.
    /// Fatal for the file.
    MalformedKeyMaterial(String),
    /// The crypto metadata stored in a file could not be parsed.
    /// Fatal for the file.
    MalformedMetadata(String),
    /// The encryption algorithm is not AES-GCM-V1 or AES-GCM-CTR-V1.
    UnsupportedAlgorithm(String),
    /// The KMS has no key for the requested master key identifier.
    KeyNotFound(String),
    /// The KMS denied access to a key.
    KeyAccessDenied(String),
    /// A column could not be decrypted because access to its key was denied.
    /// Readers may skip the column and continue with the rest of the file.
    HiddenColumn(String),
    /// Authentication tag mismatch, truncated or invalid ciphertext.
    /// Fatal for the affected module.
    Crypto(String),
    /// The KMS failed for a reason other than a missing or denied key,
    /// such as a network error or timeout. Not retried internally.
    Kms(String),
    /// The footer signature of a plaintext-footer file did not verify.
    Integrity(String),
    /// An external error variant
    External(Box<dyn Error + Send + Sync>),
}

impl std::fmt::Display for EncryptionError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self {
            EncryptionError::Config(message) => {
                write!(fmt, "Configuration error: {message}")
            }
            EncryptionError::MalformedKeyMaterial(message) => {
                write!(fmt, "Malformed key material: {message}")
            }
            EncryptionError::MalformedMetadata(message) => {
                write!(fmt, "Malformed crypto metadata: {message}")
            }
            EncryptionError::UnsupportedAlgorithm(message) => {
                write!(fmt, "Unsupported algorithm: {message}")
            }
            EncryptionError::KeyNotFound(message) => write!(fmt, "Key not found: {message}"),
            EncryptionError::KeyAccessDenied(message) => {
                write!(fmt, "Key access denied: {message}")
            }
            EncryptionError::HiddenColumn(message) => write!(fmt, "Hidden column: {message}"),
            EncryptionError::Crypto(message) => write!(fmt, "Crypto error: {message}"),
            EncryptionError::Kms(message) => write!(fmt, "KMS error: {message}"),
            EncryptionError::Integrity(message) => {
                write!(fmt, "Footer integrity error: {message}")
            }
            EncryptionError::External(e) => write!(fmt, "External: {e}"),
        }
    }
}

impl Error for EncryptionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EncryptionError::External(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for EncryptionError {
    fn from(e: io::Error) -> EncryptionError {
        EncryptionError::External(Box::new(e))
    }
}

impl From<thrift::Error> for EncryptionError {
    fn from(e: thrift::Error) -> EncryptionError {
        EncryptionError::MalformedMetadata(e.to_string())
    }
}

impl From<str::Utf8Error> for EncryptionError {
    fn from(e: str::Utf8Error) -> EncryptionError {
        EncryptionError::External(Box::new(e))
    }
}

impl From<ring::error::Unspecified> for EncryptionError {
    fn from(_: ring::error::Unspecified) -> EncryptionError {
        EncryptionError::Crypto("random number generation failed".to_string())
    }
}

/// A specialized `Result` for encryption errors.
pub type Result<T, E = EncryptionError> = result::Result<T, E>;

// ----------------------------------------------------------------------
// Conversion from `EncryptionError` to other types of `Error`s

impl From<EncryptionError> for io::Error {
    fn from(e: EncryptionError) -> Self {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

// ----------------------------------------------------------------------
// Convenient macros for different errors

macro_rules! config_err {
    ($fmt:expr) => (EncryptionError::Config($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => (EncryptionError::Config(format!($fmt, $($args),*)));
}

macro_rules! key_material_err {
    ($fmt:expr) => (EncryptionError::MalformedKeyMaterial($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => (EncryptionError::MalformedKeyMaterial(format!($fmt, $($args),*)));
}

macro_rules! metadata_err {
    ($fmt:expr) => (EncryptionError::MalformedMetadata($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => (EncryptionError::MalformedMetadata(format!($fmt, $($args),*)));
}

macro_rules! crypto_err {
    ($fmt:expr) => (EncryptionError::Crypto($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => (EncryptionError::Crypto(format!($fmt, $($args),*)));
}

macro_rules! kms_err {
    ($fmt:expr) => (EncryptionError::Kms($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => (EncryptionError::Kms(format!($fmt, $($args),*)));
}

macro_rules! integrity_err {
    ($fmt:expr) => (EncryptionError::Integrity($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => (EncryptionError::Integrity(format!($fmt, $($args),*)));
}
