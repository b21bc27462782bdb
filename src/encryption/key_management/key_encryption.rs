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

//! Encryption and decryption of data encryption keys (DEKs) with key encryption keys (KEKs)

use crate::encryption::ciphers::{GcmKey, NONCE_LEN, TAG_LEN};
use crate::errors::{EncryptionError, Result};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};

/// Encrypt a key with a wrapping key using AES-GCM, producing the
/// `base64(nonce || ciphertext || tag)` envelope stored in key material
pub(crate) fn encrypt_encryption_key(key: &[u8], aad: &[u8], wrapping_key: &[u8]) -> Result<String> {
    let wrapping_key = GcmKey::new(wrapping_key)?;

    let rng = SystemRandom::new();
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce)?;

    let ciphertext = wrapping_key.seal(&nonce, aad, key)?;

    let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(BASE64_STANDARD.encode(&envelope))
}

/// Decrypt a key from the `base64(nonce || ciphertext || tag)` envelope
/// produced by [`encrypt_encryption_key`]
pub(crate) fn decrypt_encryption_key(
    encoded_encrypted_key: &str,
    aad: &[u8],
    wrapping_key: &[u8],
) -> Result<Vec<u8>> {
    let encrypted_key = BASE64_STANDARD
        .decode(encoded_encrypted_key)
        .map_err(|e| key_material_err!("Could not base64 decode encrypted key: {}", e))?;
    if encrypted_key.len() < NONCE_LEN + TAG_LEN {
        return Err(crypto_err!(
            "Encrypted key of length {} is too short",
            encrypted_key.len()
        ));
    }

    let wrapping_key = GcmKey::new(wrapping_key)?;
    wrapping_key.open(&encrypted_key[..NONCE_LEN], aad, &encrypted_key[NONCE_LEN..])
}
