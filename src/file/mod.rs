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

//! File-level binding of Parquet Modular Encryption: footer trailers,
//! footer encryption and signing, and column chunk crypto metadata

pub mod column_crypto;
pub mod footer;

/// The magic bytes at the start of Parquet files, and at the end of files
/// with a plaintext footer
pub const PARQUET_MAGIC: [u8; 4] = *b"PAR1";

/// The magic bytes at the end of Parquet files with an encrypted footer
pub const PARQUET_MAGIC_ENCR_FOOTER: [u8; 4] = *b"PARE";

/// The number of bytes in the Parquet file trailer: a 4-byte little-endian
/// length followed by the 4-byte magic
pub const FOOTER_SIZE: usize = 8;
