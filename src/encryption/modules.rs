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

//! Derivation of additional authenticated data (AAD) for encrypted modules

use crate::errors::{EncryptionError, Result};

/// Independently encrypted regions of a Parquet file
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModuleType {
    /// File footer metadata
    Footer = 0,
    /// Column chunk metadata
    ColumnMetaData = 1,
    /// Data page body
    DataPage = 2,
    /// Dictionary page body
    DictionaryPage = 3,
    /// Data page header
    DataPageHeader = 4,
    /// Dictionary page header
    DictionaryPageHeader = 5,
    /// Column index
    ColumnIndex = 6,
    /// Offset index
    OffsetIndex = 7,
}

/// Creates the AAD for the footer module, which carries no ordinals
pub fn create_footer_aad(file_aad: &[u8]) -> Result<Vec<u8>> {
    create_module_aad(file_aad, ModuleType::Footer, 0, 0, None)
}

/// Creates the AAD for a module from the file AAD, the module type and the
/// module's ordinals within the file.
///
/// The row group and column ordinals apply to all module types except the
/// footer. The page ordinal only applies to data pages and data page headers.
pub fn create_module_aad(
    file_aad: &[u8],
    module_type: ModuleType,
    row_group_ordinal: usize,
    column_ordinal: usize,
    page_ordinal: Option<usize>,
) -> Result<Vec<u8>> {
    let module_buf = [module_type as u8];

    if module_buf[0] == (ModuleType::Footer as u8) {
        let mut aad = Vec::with_capacity(file_aad.len() + 1);
        aad.extend_from_slice(file_aad);
        aad.extend_from_slice(module_buf.as_ref());
        return Ok(aad);
    }

    if row_group_ordinal > u16::MAX as usize {
        return Err(EncryptionError::Crypto(format!(
            "Encrypted parquet files can't have more than {} row groups: {}",
            u16::MAX,
            row_group_ordinal
        )));
    }
    if column_ordinal > u16::MAX as usize {
        return Err(EncryptionError::Crypto(format!(
            "Encrypted parquet files can't have more than {} columns: {}",
            u16::MAX,
            column_ordinal
        )));
    }

    if module_buf[0] != (ModuleType::DataPageHeader as u8)
        && module_buf[0] != (ModuleType::DataPage as u8)
    {
        let mut aad = Vec::with_capacity(file_aad.len() + 5);
        aad.extend_from_slice(file_aad);
        aad.extend_from_slice(module_buf.as_ref());
        aad.extend_from_slice((row_group_ordinal as u16).to_le_bytes().as_ref());
        aad.extend_from_slice((column_ordinal as u16).to_le_bytes().as_ref());
        return Ok(aad);
    }

    let page_ordinal =
        page_ordinal.ok_or_else(|| crypto_err!("Page ordinal must be set for data pages"))?;
    if page_ordinal > u16::MAX as usize {
        return Err(EncryptionError::Crypto(format!(
            "Encrypted parquet files can't have more than {} pages per column chunk: {}",
            u16::MAX,
            page_ordinal
        )));
    }

    let mut aad = Vec::with_capacity(file_aad.len() + 7);
    aad.extend_from_slice(file_aad);
    aad.extend_from_slice(module_buf.as_ref());
    aad.extend_from_slice((row_group_ordinal as u16).to_le_bytes().as_ref());
    aad.extend_from_slice((column_ordinal as u16).to_le_bytes().as_ref());
    aad.extend_from_slice((page_ordinal as u16).to_le_bytes().as_ref());
    Ok(aad)
}
