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

//! This crate implements Parquet Modular Encryption: the key management and
//! cryptographic binding layer that lets the Parquet columnar format encrypt
//! its footer metadata and individual column chunks with independent keys,
//! while remaining partially readable by clients authorized for only a
//! subset of columns.
//!
//! # Overview
//!
//! - [`encryption::key_management`] wraps and unwraps data encryption keys
//!   against master keys held by a pluggable Key Management Server,
//!   optionally through locally cached key encryption keys ("double
//!   wrapping"), and amortizes KMS calls with expiring per-token caches.
//! - [`encryption::encrypt`] and [`encryption::decrypt`] issue per-module
//!   encryptors and decryptors tied to row group and column ordinals.
//! - [`encryption::ciphers`] implements the AES-GCM and AES-GCM-CTR module
//!   ciphers with 128, 192 and 256 bit keys.
//! - [`file`] binds it all to the file format: footer trailers, encrypted
//!   and signed-plaintext footers, and encrypted column chunk metadata.
//!
//! The page reader and writer, and the Thrift codec for `FileMetaData` and
//! `ColumnMetaData`, are external collaborators: their serialized bytes pass
//! through this crate as opaque buffers.

#![warn(missing_docs)]

#[macro_use]
pub mod errors;
pub mod encryption;
pub mod file;
#[allow(missing_docs)]
pub mod format;
