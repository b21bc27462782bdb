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

//! End-to-end tests writing and reading files protected with Parquet
//! Modular Encryption.
//!
//! The page payloads and the `FileMetaData`/`ColumnMetaData` structures are
//! stand-ins (JSON blobs), since their codecs live outside this crate; the
//! module framing, AADs, key management and footer binding are the real
//! thing.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use parquet_crypto::encryption::decrypt::{
    CryptoContext, FileDecryptionProperties, FileDecryptor,
};
use parquet_crypto::encryption::encrypt::{FileEncryptionProperties, FileEncryptor};
use parquet_crypto::encryption::key_management::crypto_factory::{
    CryptoFactory, DecryptionConfiguration, EncryptionConfigurationBuilder,
};
use parquet_crypto::encryption::key_management::kms::KmsConnectionConfig;
use parquet_crypto::encryption::key_management::test_kms::TestKmsClientFactory;
use parquet_crypto::encryption::modules::{create_module_aad, ModuleType};
use parquet_crypto::encryption::ParquetCipher;
use parquet_crypto::errors::{EncryptionError, Result};
use parquet_crypto::file::column_crypto::{
    column_crypto_metadata, decrypt_column_metadata, encrypt_column_metadata,
};
use parquet_crypto::file::footer::{
    read_encrypted_footer, read_signed_plaintext_footer, write_encrypted_footer,
    write_signed_plaintext_footer, FooterTail,
};
use parquet_crypto::file::{FOOTER_SIZE, PARQUET_MAGIC};
use parquet_crypto::format::{
    from_thrift_bytes, to_thrift_bytes, ColumnCryptoMetaData, EncryptionAlgorithm,
};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

/// 16 zero bytes, base64 encoded the way KMS key lists are configured
const ZERO_KEY_BASE64: &str = "AAAAAAAAAAAAAAAAAAAAAA==";

fn kms_keys(entries: &[(&str, &str)]) -> HashMap<String, Vec<u8>> {
    entries
        .iter()
        .map(|(id, key)| ((*id).to_owned(), BASE64_STANDARD.decode(key).unwrap()))
        .collect()
}

/// Writes a toy single-row-group file: a `PAR1` header, one encrypted data
/// page per column, and an encrypted or signed footer describing them
fn write_test_file(
    encryption_properties: FileEncryptionProperties,
    columns: &[(&str, &[u8])],
) -> Result<Vec<u8>> {
    let encryptor = FileEncryptor::new(encryption_properties)?;
    let mut file = Vec::new();
    file.write_all(&PARQUET_MAGIC)?;

    let mut column_records = Vec::new();
    for (column_ordinal, (column_path, page_data)) in columns.iter().enumerate() {
        let page_offset = file.len();
        let page_aad = create_module_aad(
            encryptor.file_aad(),
            ModuleType::DataPage,
            0,
            column_ordinal,
            Some(0),
        )?;
        let page = encryptor
            .get_column_data_encryptor(column_path)?
            .encrypt(page_data, &page_aad)?;
        file.write_all(&page)?;

        let column_metadata = serde_json::to_vec(&json!({
            "path": column_path,
            "page_offset": page_offset,
            "page_length": page.len(),
        }))
        .unwrap();
        let encrypted_column_metadata =
            encrypt_column_metadata(&encryptor, column_path, 0, column_ordinal, &column_metadata)?;

        let crypto_metadata = column_crypto_metadata(&encryptor, column_path)
            .expect("all test columns are encrypted");
        column_records.push(json!({
            "path": column_path,
            "crypto_metadata": BASE64_STANDARD.encode(to_thrift_bytes(&crypto_metadata)?),
            "encrypted_column_metadata": BASE64_STANDARD.encode(&encrypted_column_metadata),
        }));
    }

    if encryptor.properties().encrypt_footer() {
        let metadata = serde_json::to_vec(&json!({ "columns": column_records })).unwrap();
        write_encrypted_footer(&mut file, &metadata, &encryptor)?;
    } else {
        // A plaintext footer carries the algorithm record and the signing
        // key metadata inside the (external) FileMetaData structure
        let algorithm = encryptor.properties().encryption_algorithm();
        let metadata = serde_json::to_vec(&json!({
            "columns": column_records,
            "encryption_algorithm": BASE64_STANDARD.encode(to_thrift_bytes(&algorithm)?),
            "footer_signing_key_metadata": encryptor
                .properties()
                .footer_key_metadata()
                .map(|md| BASE64_STANDARD.encode(md)),
        }))
        .unwrap();
        write_signed_plaintext_footer(&mut file, &metadata, &encryptor)?;
    }
    Ok(file)
}

/// The outcome of reading one column from a test file
#[derive(Debug, PartialEq)]
enum ColumnOutcome {
    Data(Vec<u8>),
    Hidden,
}

fn decode_file_footer(
    file: &[u8],
    decryption_properties: &Arc<FileDecryptionProperties>,
) -> Result<(serde_json::Value, FileDecryptor)> {
    let tail: &[u8; FOOTER_SIZE] = file[file.len() - FOOTER_SIZE..].try_into().unwrap();
    let tail = FooterTail::try_new(tail)?;
    let footer_start = file.len() - FOOTER_SIZE - tail.metadata_length();
    let footer = &file[footer_start..file.len() - FOOTER_SIZE];

    if tail.is_encrypted_footer() {
        let (metadata, decryptor) = read_encrypted_footer(footer, decryption_properties)?;
        Ok((serde_json::from_slice(&metadata).unwrap(), decryptor))
    } else {
        let metadata: serde_json::Value =
            serde_json::from_slice(&footer[..footer.len() - 28]).unwrap();
        let algorithm_bytes = BASE64_STANDARD
            .decode(metadata["encryption_algorithm"].as_str().unwrap())
            .unwrap();
        let (algorithm, _) = from_thrift_bytes::<EncryptionAlgorithm>(&algorithm_bytes)?;
        let footer_key_metadata = metadata["footer_signing_key_metadata"]
            .as_str()
            .map(|md| BASE64_STANDARD.decode(md).unwrap());
        let decryptor = read_signed_plaintext_footer(
            footer,
            &algorithm,
            footer_key_metadata.as_deref(),
            decryption_properties,
        )?;
        Ok((metadata, decryptor))
    }
}

/// Reads back every column of a test file, reporting hidden columns while
/// continuing with the readable ones
fn read_test_file(
    file: &[u8],
    decryption_properties: &Arc<FileDecryptionProperties>,
) -> Result<Vec<(String, ColumnOutcome)>> {
    let (metadata, decryptor) = decode_file_footer(file, decryption_properties)?;

    let mut results = Vec::new();
    for (column_ordinal, column_record) in
        metadata["columns"].as_array().unwrap().iter().enumerate()
    {
        let column_path = column_record["path"].as_str().unwrap().to_owned();
        let crypto_metadata_bytes = BASE64_STANDARD
            .decode(column_record["crypto_metadata"].as_str().unwrap())
            .unwrap();
        let (crypto_metadata, _) = from_thrift_bytes::<ColumnCryptoMetaData>(&crypto_metadata_bytes)?;
        let encrypted_column_metadata = BASE64_STANDARD
            .decode(column_record["encrypted_column_metadata"].as_str().unwrap())
            .unwrap();

        let column_metadata = match decrypt_column_metadata(
            &decryptor,
            &crypto_metadata,
            0,
            column_ordinal,
            &encrypted_column_metadata,
        ) {
            Ok(column_metadata) => column_metadata,
            Err(EncryptionError::HiddenColumn(_)) => {
                results.push((column_path, ColumnOutcome::Hidden));
                continue;
            }
            Err(e) => return Err(e),
        };
        let column_metadata: serde_json::Value = serde_json::from_slice(&column_metadata).unwrap();
        let page_offset = column_metadata["page_offset"].as_u64().unwrap() as usize;
        let page_length = column_metadata["page_length"].as_u64().unwrap() as usize;

        let context = match CryptoContext::for_column(
            &decryptor,
            &crypto_metadata,
            0,
            column_ordinal,
        ) {
            Ok(context) => context.with_page_ordinal(0),
            Err(EncryptionError::HiddenColumn(_)) => {
                results.push((column_path, ColumnOutcome::Hidden));
                continue;
            }
            Err(e) => return Err(e),
        };
        let page = &file[page_offset..page_offset + page_length];
        let data = context
            .data_decryptor()
            .decrypt(page, &context.create_page_aad()?)?;
        results.push((column_path, ColumnOutcome::Data(data)));
    }
    Ok(results)
}

#[test]
fn test_uniform_gcm_round_trip() {
    let kms_factory = Arc::new(TestKmsClientFactory::with_keys(kms_keys(&[(
        "kf",
        ZERO_KEY_BASE64,
    )])));
    let crypto_factory = CryptoFactory::new(kms_factory.clone());
    let kms_config = Arc::new(KmsConnectionConfig::default());

    let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
        .set_uniform_encryption(true)
        .set_encryption_algorithm(ParquetCipher::AesGcmV1)
        .set_double_wrapping(false)
        .set_data_key_length_bits(128)
        .build()
        .unwrap();
    let encryption_properties = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();

    let file = write_test_file(encryption_properties, &[("a", &[1, 2, 3])]).unwrap();

    let decryption_properties = crypto_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();
    let columns = read_test_file(&file, &decryption_properties).unwrap();

    assert_eq!(
        columns,
        vec![("a".to_owned(), ColumnOutcome::Data(vec![1, 2, 3]))]
    );
}

#[test]
fn test_per_column_keys_with_denied_column() {
    let keys = kms_keys(&[
        ("kf", ZERO_KEY_BASE64),
        ("k1", "EBAQEBAQEBAQEBAQEBAQEA=="),
        ("k2", "ISEhISEhISEhISEhISEhIQ=="),
    ]);

    let writer_factory = Arc::new(TestKmsClientFactory::with_keys(keys.clone()));
    let crypto_factory = CryptoFactory::new(writer_factory);
    let kms_config = Arc::new(KmsConnectionConfig::default());

    let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
        .set_column_keys("k1:a;k2:b")
        .unwrap()
        .build()
        .unwrap();
    let encryption_properties = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();

    let file = write_test_file(
        encryption_properties,
        &[("a", &[1, 2, 3]), ("b", &[4, 5, 6])],
    )
    .unwrap();

    // The reader's KMS denies access to the key for column "b"
    let reader_factory =
        Arc::new(TestKmsClientFactory::with_keys(keys).deny_access_to("k2"));
    let reader_crypto_factory = CryptoFactory::new(reader_factory);
    let decryption_properties = reader_crypto_factory
        .file_decryption_properties(kms_config, DecryptionConfiguration::default())
        .unwrap();

    let columns = read_test_file(&file, &decryption_properties).unwrap();
    assert_eq!(
        columns,
        vec![
            ("a".to_owned(), ColumnOutcome::Data(vec![1, 2, 3])),
            ("b".to_owned(), ColumnOutcome::Hidden),
        ]
    );
}

#[test]
fn test_double_wrapping_reuses_kek_across_files() {
    let kms_factory = Arc::new(TestKmsClientFactory::with_keys(kms_keys(&[(
        "k1",
        ZERO_KEY_BASE64,
    )])));
    let crypto_factory = CryptoFactory::new(kms_factory.clone());
    let kms_config = Arc::new(KmsConnectionConfig::default());

    let encryption_config = || {
        EncryptionConfigurationBuilder::new("k1".to_owned())
            .set_uniform_encryption(true)
            .set_double_wrapping(true)
            .build()
            .unwrap()
    };

    for _ in 0..2 {
        let encryption_properties = crypto_factory
            .file_encryption_properties(kms_config.clone(), &encryption_config())
            .unwrap();
        write_test_file(encryption_properties, &[("a", &[1, 2, 3])]).unwrap();
    }

    // Both files used the same cached KEK, so the KMS wrapped exactly one key
    assert_eq!(kms_factory.keys_wrapped(), 1);
}

#[test]
fn test_key_rotation() {
    let kms_factory = Arc::new(TestKmsClientFactory::with_keys(kms_keys(&[(
        "kf",
        ZERO_KEY_BASE64,
    )])));
    let crypto_factory = CryptoFactory::new(kms_factory.clone());
    let kms_config = Arc::new(KmsConnectionConfig::default());

    let encryption_config = EncryptionConfigurationBuilder::new("kf".to_owned())
        .set_uniform_encryption(true)
        .set_double_wrapping(false)
        .build()
        .unwrap();
    let encryption_properties = crypto_factory
        .file_encryption_properties(kms_config.clone(), &encryption_config)
        .unwrap();
    let file = write_test_file(encryption_properties, &[("a", &[1, 2, 3])]).unwrap();

    // Rotate in a map that still carries "kf" with the same key bytes:
    // lookups go to the post-rotation map, so reading still succeeds
    let mut v2 = kms_keys(&[("kf", ZERO_KEY_BASE64)]);
    v2.insert("knew".to_owned(), vec![7u8; 16]);
    kms_factory.start_key_rotation(v2);
    kms_factory.finish_key_rotation();

    let decryption_properties = crypto_factory
        .file_decryption_properties(
            kms_config.clone(),
            // Key caching would mask the rotation, which is what this test observes
            DecryptionConfiguration::builder()
                .set_cache_lifetime(None)
                .build(),
        )
        .unwrap();
    let columns = read_test_file(&file, &decryption_properties).unwrap();
    assert_eq!(
        columns,
        vec![("a".to_owned(), ColumnOutcome::Data(vec![1, 2, 3]))]
    );

    // Removing "kf" from the rotated map makes the file unreadable
    kms_factory.start_key_rotation(HashMap::new());
    kms_factory.finish_key_rotation();

    let result = read_test_file(&file, &decryption_properties);
    assert!(matches!(result, Err(EncryptionError::KeyNotFound(_))));
}

#[test]
fn test_aad_prefix_must_be_supplied() {
    let footer_key = b"0123456789012345".to_vec();
    let encryption_properties = FileEncryptionProperties::builder(footer_key.clone())
        .with_aad_prefix(b"audit-2024".to_vec())
        .with_aad_prefix_storage(false)
        .build()
        .unwrap();
    assert!(encryption_properties.supply_aad_prefix());

    let file = write_test_file(encryption_properties, &[("a", &[1, 2, 3])]).unwrap();

    // Reader without a prefix fails
    let decryption_properties = FileDecryptionProperties::builder(footer_key.clone())
        .build()
        .unwrap();
    assert!(read_test_file(&file, &decryption_properties).is_err());

    // Reader with the wrong prefix fails
    let decryption_properties = FileDecryptionProperties::builder(footer_key.clone())
        .with_aad_prefix(b"audit-2023".to_vec())
        .build()
        .unwrap();
    assert!(matches!(
        read_test_file(&file, &decryption_properties),
        Err(EncryptionError::Crypto(_))
    ));

    // Reader with the correct prefix succeeds
    let decryption_properties = FileDecryptionProperties::builder(footer_key)
        .with_aad_prefix(b"audit-2024".to_vec())
        .build()
        .unwrap();
    let columns = read_test_file(&file, &decryption_properties).unwrap();
    assert_eq!(
        columns,
        vec![("a".to_owned(), ColumnOutcome::Data(vec![1, 2, 3]))]
    );
}

#[test]
fn test_plaintext_footer_integrity() {
    let footer_key = b"0123456789012345".to_vec();
    let encryption_properties = FileEncryptionProperties::builder(footer_key.clone())
        .with_plaintext_footer(true)
        .build()
        .unwrap();

    let file = write_test_file(encryption_properties, &[("a", &[1, 2, 3])]).unwrap();

    // The unchanged file verifies clean and is readable
    let decryption_properties = FileDecryptionProperties::builder(footer_key.clone())
        .build()
        .unwrap();
    let columns = read_test_file(&file, &decryption_properties).unwrap();
    assert_eq!(
        columns,
        vec![("a".to_owned(), ColumnOutcome::Data(vec![1, 2, 3]))]
    );

    // Flipping one byte of the plaintext footer metadata fails verification.
    // The flipped byte is the column name inside the footer JSON, which keeps
    // the metadata parseable so the failure comes from the signature check.
    let needle = b"\"path\":\"a\"";
    let position = file
        .windows(needle.len())
        .position(|window| window == needle)
        .unwrap();
    let mut tampered = file.clone();
    tampered[position + needle.len() - 2] ^= 1;

    let result = read_test_file(&tampered, &decryption_properties);
    assert!(matches!(result, Err(EncryptionError::Integrity(_))));
}

#[test]
fn test_gcm_ctr_round_trip() {
    let footer_key = b"0123456789012345".to_vec();
    let encryption_properties = FileEncryptionProperties::builder(footer_key.clone())
        .with_cipher(ParquetCipher::AesGcmCtrV1)
        .build()
        .unwrap();

    let file = write_test_file(encryption_properties, &[("a", &[1, 2, 3])]).unwrap();

    let decryption_properties = FileDecryptionProperties::builder(footer_key).build().unwrap();
    let columns = read_test_file(&file, &decryption_properties).unwrap();
    assert_eq!(
        columns,
        vec![("a".to_owned(), ColumnOutcome::Data(vec![1, 2, 3]))]
    );
}

#[test]
fn test_larger_keys_round_trip() {
    for key_len in [24, 32] {
        let footer_key = vec![3u8; key_len];
        let encryption_properties = FileEncryptionProperties::builder(footer_key.clone())
            .build()
            .unwrap();

        let file = write_test_file(encryption_properties, &[("a", &[1, 2, 3])]).unwrap();

        let decryption_properties =
            FileDecryptionProperties::builder(footer_key).build().unwrap();
        let columns = read_test_file(&file, &decryption_properties).unwrap();
        assert_eq!(
            columns,
            vec![("a".to_owned(), ColumnOutcome::Data(vec![1, 2, 3]))]
        );
    }
}

#[test]
fn test_encrypted_footer_wrong_key_is_fatal() {
    let encryption_properties = FileEncryptionProperties::builder(b"0123456789012345".to_vec())
        .build()
        .unwrap();
    let file = write_test_file(encryption_properties, &[("a", &[1, 2, 3])]).unwrap();

    let decryption_properties = FileDecryptionProperties::builder(vec![9u8; 16])
        .build()
        .unwrap();
    let result = read_test_file(&file, &decryption_properties);
    assert!(matches!(result, Err(EncryptionError::Crypto(_))));
}

#[test]
fn test_file_written_to_disk_round_trips() {
    let footer_key = b"0123456789012345".to_vec();
    let encryption_properties = FileEncryptionProperties::builder(footer_key.clone())
        .build()
        .unwrap();
    let file = write_test_file(encryption_properties, &[("a", &[1, 2, 3])]).unwrap();

    let mut temp_file = tempfile::tempfile().unwrap();
    temp_file.write_all(&file).unwrap();

    use std::io::{Read, Seek, SeekFrom};
    let mut read_back = Vec::new();
    temp_file.seek(SeekFrom::Start(0)).unwrap();
    temp_file.read_to_end(&mut read_back).unwrap();

    let decryption_properties = FileDecryptionProperties::builder(footer_key).build().unwrap();
    let columns = read_test_file(&read_back, &decryption_properties).unwrap();
    assert_eq!(
        columns,
        vec![("a".to_owned(), ColumnOutcome::Data(vec![1, 2, 3]))]
    );
}
