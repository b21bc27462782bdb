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

//! AES-GCM and AES-GCM-CTR block ciphers for Parquet modules.
//!
//! Modules are framed on disk as
//! `length (4 bytes LE) || nonce (12 bytes) || ciphertext || tag (16 bytes)`,
//! where the stored length covers everything after the length field and the
//! tag is absent for AES-CTR encrypted data pages.

use crate::errors::{EncryptionError, Result};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadInPlace, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr32BE;
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt::Debug;
use zeroize::Zeroizing;

pub(crate) const NONCE_LEN: usize = 12;
pub(crate) const TAG_LEN: usize = 16;
pub(crate) const SIZE_LEN: usize = 4;

/// Framing overhead of a GCM-encrypted module: length, nonce and tag
pub const GCM_CIPHERTEXT_SIZE_DELTA: usize = SIZE_LEN + NONCE_LEN + TAG_LEN;
/// Framing overhead of a CTR-encrypted module: length and nonce
pub const CTR_CIPHERTEXT_SIZE_DELTA: usize = SIZE_LEN + NONCE_LEN;

type Aes192Gcm = AesGcm<Aes192, aes_gcm::aead::consts::U12>;

type Aes128Ctr = Ctr32BE<Aes128>;
type Aes192Ctr = Ctr32BE<Aes192>;
type Aes256Ctr = Ctr32BE<Aes256>;

/// Encrypts Parquet modules, producing the on-disk framing
pub trait BlockEncryptor: Debug + Send + Sync {
    /// Encrypt a module body with the given AAD
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// The number of bytes the on-disk framing adds to the plaintext length
    fn ciphertext_size_delta(&self) -> usize;

    /// Compute the footer signature `nonce || tag` over a plaintext footer.
    /// Only supported by GCM encryptors.
    fn sign(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}

/// Decrypts Parquet modules from the on-disk framing
pub trait BlockDecryptor: Debug + Send + Sync {
    /// Decrypt a framed module, verifying the tag against the AAD for GCM modules
    fn decrypt(&self, length_and_ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// The number of bytes the on-disk framing adds to the plaintext length
    fn ciphertext_size_delta(&self) -> usize;

    /// Recompute the authentication tag of a signed plaintext footer
    /// `metadata || nonce || tag`, using the recorded nonce.
    /// Only supported by GCM decryptors.
    fn compute_plaintext_tag(&self, aad: &[u8], plaintext_footer: &[u8]) -> Result<Vec<u8>>;
}

/// An AES-GCM key of one of the three lengths accepted by the format
#[derive(Clone)]
pub(crate) enum GcmKey {
    Aes128(Box<Aes128Gcm>),
    Aes192(Box<Aes192Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl Debug for GcmKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits = match self {
            GcmKey::Aes128(_) => 128,
            GcmKey::Aes192(_) => 192,
            GcmKey::Aes256(_) => 256,
        };
        write!(f, "GcmKey {{ AES-{bits} }}")
    }
}

impl GcmKey {
    pub(crate) fn new(key_bytes: &[u8]) -> Result<Self> {
        match key_bytes.len() {
            16 => Ok(GcmKey::Aes128(Box::new(Aes128Gcm::new(
                GenericArray::from_slice(key_bytes),
            )))),
            24 => Ok(GcmKey::Aes192(Box::new(Aes192Gcm::new(
                GenericArray::from_slice(key_bytes),
            )))),
            32 => Ok(GcmKey::Aes256(Box::new(Aes256Gcm::new(
                GenericArray::from_slice(key_bytes),
            )))),
            len => Err(config_err!(
                "encryption key must be 16, 24 or 32 bytes in length, got {}",
                len
            )),
        }
    }

    /// Encrypt, returning `ciphertext || tag`
    pub(crate) fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let nonce = GenericArray::from_slice(nonce);
        match self {
            GcmKey::Aes128(key) => key.encrypt(nonce, payload),
            GcmKey::Aes192(key) => key.encrypt(nonce, payload),
            GcmKey::Aes256(key) => key.encrypt(nonce, payload),
        }
        .map_err(|_| crypto_err!("AES-GCM encryption failed"))
    }

    /// Decrypt `ciphertext || tag`, verifying the tag
    pub(crate) fn open(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_LEN {
            return Err(crypto_err!(
                "Ciphertext of length {} is too short to hold an authentication tag",
                ciphertext.len()
            ));
        }
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        let nonce = GenericArray::from_slice(nonce);
        match self {
            GcmKey::Aes128(key) => key.decrypt(nonce, payload),
            GcmKey::Aes192(key) => key.decrypt(nonce, payload),
            GcmKey::Aes256(key) => key.decrypt(nonce, payload),
        }
        .map_err(|_| crypto_err!("AES-GCM tag verification failed"))
    }

    /// Compute the authentication tag over a plaintext without keeping the ciphertext
    pub(crate) fn compute_tag(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = Zeroizing::new(plaintext.to_vec());
        let nonce = GenericArray::from_slice(nonce);
        let tag = match self {
            GcmKey::Aes128(key) => key.encrypt_in_place_detached(nonce, aad, &mut buffer),
            GcmKey::Aes192(key) => key.encrypt_in_place_detached(nonce, aad, &mut buffer),
            GcmKey::Aes256(key) => key.encrypt_in_place_detached(nonce, aad, &mut buffer),
        }
        .map_err(|_| crypto_err!("AES-GCM encryption failed"))?;
        Ok(tag.to_vec())
    }
}

fn random_nonce() -> Result<[u8; NONCE_LEN]> {
    let rng = SystemRandom::new();
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce)?;
    Ok(nonce)
}

/// Splits the module framing into `(nonce, remainder)`, validating the
/// stored length against the buffer.
fn split_framing(length_and_ciphertext: &[u8], min_payload: usize) -> Result<(&[u8], &[u8])> {
    if length_and_ciphertext.len() < SIZE_LEN + NONCE_LEN + min_payload {
        return Err(crypto_err!(
            "Ciphertext buffer size {} is too small",
            length_and_ciphertext.len()
        ));
    }
    let written_len =
        u32::from_le_bytes(length_and_ciphertext[..SIZE_LEN].try_into().unwrap()) as usize;
    if written_len != length_and_ciphertext.len() - SIZE_LEN {
        return Err(crypto_err!(
            "Ciphertext length {} doesn't match buffer size {}",
            written_len,
            length_and_ciphertext.len() - SIZE_LEN
        ));
    }
    let nonce = &length_and_ciphertext[SIZE_LEN..SIZE_LEN + NONCE_LEN];
    let remainder = &length_and_ciphertext[SIZE_LEN + NONCE_LEN..];
    Ok((nonce, remainder))
}

/// AES-GCM encryptor used for all metadata modules and, under
/// AES-GCM-V1, for data pages as well
#[derive(Clone, Debug)]
pub(crate) struct GcmBlockEncryptor {
    key: GcmKey,
}

impl GcmBlockEncryptor {
    pub(crate) fn new(key_bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: GcmKey::new(key_bytes)?,
        })
    }
}

impl BlockEncryptor for GcmBlockEncryptor {
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = random_nonce()?;
        let ciphertext = self.key.seal(&nonce, aad, plaintext)?;

        let written_len = (NONCE_LEN + ciphertext.len()) as u32;
        let mut result = Vec::with_capacity(SIZE_LEN + NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&written_len.to_le_bytes());
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn ciphertext_size_delta(&self) -> usize {
        GCM_CIPHERTEXT_SIZE_DELTA
    }

    fn sign(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = random_nonce()?;
        let tag = self.key.compute_tag(&nonce, aad, plaintext)?;

        let mut result = Vec::with_capacity(NONCE_LEN + TAG_LEN);
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&tag);
        Ok(result)
    }
}

/// AES-GCM decryptor matching [`GcmBlockEncryptor`]
#[derive(Clone, Debug)]
pub(crate) struct GcmBlockDecryptor {
    key: GcmKey,
}

impl GcmBlockDecryptor {
    pub(crate) fn new(key_bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: GcmKey::new(key_bytes)?,
        })
    }
}

impl BlockDecryptor for GcmBlockDecryptor {
    fn decrypt(&self, length_and_ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let (nonce, ciphertext) = split_framing(length_and_ciphertext, TAG_LEN)?;
        self.key.open(nonce, aad, ciphertext)
    }

    fn ciphertext_size_delta(&self) -> usize {
        GCM_CIPHERTEXT_SIZE_DELTA
    }

    fn compute_plaintext_tag(&self, aad: &[u8], plaintext_footer: &[u8]) -> Result<Vec<u8>> {
        // Plaintext footer format is: [metadata, nonce, authentication tag]
        if plaintext_footer.len() < NONCE_LEN + TAG_LEN {
            return Err(EncryptionError::Integrity(format!(
                "Signed footer of length {} is too short to hold a signature",
                plaintext_footer.len()
            )));
        }
        let metadata_len = plaintext_footer.len() - NONCE_LEN - TAG_LEN;
        let metadata = &plaintext_footer[..metadata_len];
        let nonce = &plaintext_footer[metadata_len..metadata_len + NONCE_LEN];
        self.key.compute_tag(nonce, aad, metadata)
    }
}

/// An AES key held as raw bytes for per-call AES-CTR cipher construction.
/// The counter block is the 12-byte nonce followed by a 4-byte big-endian
/// block counter starting at 1.
#[derive(Clone)]
struct CtrKey {
    key_bytes: Zeroizing<Vec<u8>>,
}

impl Debug for CtrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CtrKey {{ AES-{} }}", self.key_bytes.len() * 8)
    }
}

impl CtrKey {
    fn new(key_bytes: &[u8]) -> Result<Self> {
        match key_bytes.len() {
            16 | 24 | 32 => Ok(Self {
                key_bytes: Zeroizing::new(key_bytes.to_vec()),
            }),
            len => Err(config_err!(
                "encryption key must be 16, 24 or 32 bytes in length, got {}",
                len
            )),
        }
    }

    fn apply_keystream(&self, nonce: &[u8], buffer: &mut [u8]) {
        let mut iv = [0u8; 16];
        iv[..NONCE_LEN].copy_from_slice(nonce);
        iv[15] = 1;
        let iv = GenericArray::from_slice(&iv);
        match self.key_bytes.len() {
            16 => {
                Aes128Ctr::new(GenericArray::from_slice(&self.key_bytes), iv)
                    .apply_keystream(buffer);
            }
            24 => {
                Aes192Ctr::new(GenericArray::from_slice(&self.key_bytes), iv)
                    .apply_keystream(buffer);
            }
            _ => {
                Aes256Ctr::new(GenericArray::from_slice(&self.key_bytes), iv)
                    .apply_keystream(buffer);
            }
        }
    }
}

/// AES-CTR encryptor for data pages under AES-GCM-CTR-V1.
/// Pages carry no tag; their headers remain GCM-protected.
#[derive(Clone, Debug)]
pub(crate) struct CtrBlockEncryptor {
    key: CtrKey,
}

impl CtrBlockEncryptor {
    pub(crate) fn new(key_bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: CtrKey::new(key_bytes)?,
        })
    }
}

impl BlockEncryptor for CtrBlockEncryptor {
    fn encrypt(&self, plaintext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = random_nonce()?;

        let written_len = (NONCE_LEN + plaintext.len()) as u32;
        let mut result = Vec::with_capacity(SIZE_LEN + NONCE_LEN + plaintext.len());
        result.extend_from_slice(&written_len.to_le_bytes());
        result.extend_from_slice(&nonce);
        result.extend_from_slice(plaintext);
        self.key
            .apply_keystream(&nonce, &mut result[SIZE_LEN + NONCE_LEN..]);
        Ok(result)
    }

    fn ciphertext_size_delta(&self) -> usize {
        CTR_CIPHERTEXT_SIZE_DELTA
    }

    fn sign(&self, _plaintext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        Err(crypto_err!("Footer signing requires an AES-GCM encryptor"))
    }
}

/// AES-CTR decryptor matching [`CtrBlockEncryptor`]
#[derive(Clone, Debug)]
pub(crate) struct CtrBlockDecryptor {
    key: CtrKey,
}

impl CtrBlockDecryptor {
    pub(crate) fn new(key_bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: CtrKey::new(key_bytes)?,
        })
    }
}

impl BlockDecryptor for CtrBlockDecryptor {
    fn decrypt(&self, length_and_ciphertext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        let (nonce, ciphertext) = split_framing(length_and_ciphertext, 0)?;
        let mut result = ciphertext.to_vec();
        self.key.apply_keystream(nonce, &mut result);
        Ok(result)
    }

    fn ciphertext_size_delta(&self) -> usize {
        CTR_CIPHERTEXT_SIZE_DELTA
    }

    fn compute_plaintext_tag(&self, _aad: &[u8], _plaintext_footer: &[u8]) -> Result<Vec<u8>> {
        Err(crypto_err!(
            "Footer signature verification requires an AES-GCM decryptor"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn keys() -> Vec<Vec<u8>> {
        vec![vec![0u8; 16], vec![1u8; 24], vec![2u8; 32]]
    }

    #[test]
    fn test_gcm_round_trip_all_key_sizes() {
        for key in keys() {
            let encryptor = GcmBlockEncryptor::new(&key).unwrap();
            let decryptor = GcmBlockDecryptor::new(&key).unwrap();

            let plaintext = b"module plaintext";
            let aad = b"module aad";
            let ciphertext = encryptor.encrypt(plaintext, aad).unwrap();

            assert_eq!(
                ciphertext.len(),
                plaintext.len() + encryptor.ciphertext_size_delta()
            );
            assert_eq!(decryptor.decrypt(&ciphertext, aad).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_ctr_round_trip_all_key_sizes() {
        for key in keys() {
            let encryptor = CtrBlockEncryptor::new(&key).unwrap();
            let decryptor = CtrBlockDecryptor::new(&key).unwrap();

            let plaintext = b"data page plaintext";
            let ciphertext = encryptor.encrypt(plaintext, b"").unwrap();

            assert_eq!(
                ciphertext.len(),
                plaintext.len() + encryptor.ciphertext_size_delta()
            );
            assert_eq!(decryptor.decrypt(&ciphertext, b"").unwrap(), plaintext);
        }
    }

    #[test]
    fn test_invalid_key_lengths() {
        for len in [0, 15, 17, 33] {
            let key = vec![0u8; len];
            assert!(matches!(
                GcmBlockEncryptor::new(&key),
                Err(EncryptionError::Config(_))
            ));
            assert!(matches!(
                CtrBlockEncryptor::new(&key),
                Err(EncryptionError::Config(_))
            ));
        }
    }

    #[test]
    fn test_gcm_wrong_aad_fails() {
        let key = vec![0u8; 16];
        let encryptor = GcmBlockEncryptor::new(&key).unwrap();
        let decryptor = GcmBlockDecryptor::new(&key).unwrap();

        let ciphertext = encryptor.encrypt(b"plaintext", b"aad one").unwrap();
        assert!(matches!(
            decryptor.decrypt(&ciphertext, b"aad two"),
            Err(EncryptionError::Crypto(_))
        ));
    }

    #[test]
    fn test_gcm_wrong_key_fails() {
        let encryptor = GcmBlockEncryptor::new(&[0u8; 16]).unwrap();
        let decryptor = GcmBlockDecryptor::new(&[1u8; 16]).unwrap();

        let ciphertext = encryptor.encrypt(b"plaintext", b"aad").unwrap();
        assert!(matches!(
            decryptor.decrypt(&ciphertext, b"aad"),
            Err(EncryptionError::Crypto(_))
        ));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = vec![0u8; 16];
        let encryptor = GcmBlockEncryptor::new(&key).unwrap();
        let decryptor = GcmBlockDecryptor::new(&key).unwrap();

        let mut ciphertext = encryptor.encrypt(b"plaintext", b"aad").unwrap();
        ciphertext.truncate(ciphertext.len() - 1);
        assert!(matches!(
            decryptor.decrypt(&ciphertext, b"aad"),
            Err(EncryptionError::Crypto(_))
        ));
    }

    #[test]
    fn test_nonces_are_distinct() {
        let key = vec![0u8; 16];
        let encryptor = GcmBlockEncryptor::new(&key).unwrap();

        let mut nonces = HashSet::new();
        for _ in 0..256 {
            let ciphertext = encryptor.encrypt(b"plaintext", b"aad").unwrap();
            let nonce = ciphertext[SIZE_LEN..SIZE_LEN + NONCE_LEN].to_vec();
            assert_eq!(nonce.len(), NONCE_LEN);
            assert!(nonces.insert(nonce));
        }
    }

    #[test]
    fn test_sign_then_verify_tag() {
        let key = vec![0u8; 16];
        let encryptor = GcmBlockEncryptor::new(&key).unwrap();
        let decryptor = GcmBlockDecryptor::new(&key).unwrap();

        let footer = b"serialized footer bytes";
        let aad = b"footer aad";
        let signature = encryptor.sign(footer, aad).unwrap();
        assert_eq!(signature.len(), NONCE_LEN + TAG_LEN);

        let mut signed_footer = footer.to_vec();
        signed_footer.extend_from_slice(&signature);

        let computed = decryptor.compute_plaintext_tag(aad, &signed_footer).unwrap();
        assert_eq!(computed, &signed_footer[signed_footer.len() - TAG_LEN..]);

        // A flipped metadata byte must change the computed tag
        signed_footer[0] ^= 1;
        let computed = decryptor.compute_plaintext_tag(aad, &signed_footer).unwrap();
        assert_ne!(computed, &signed_footer[signed_footer.len() - TAG_LEN..]);
    }
}
