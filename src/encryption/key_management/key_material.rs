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

use crate::errors::{EncryptionError, Result};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

const KEY_MATERIAL_TYPE: &str = "PKMT1";

/// Serializable key material that describes a wrapped encryption key
/// and includes metadata required to unwrap it.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyMaterial {
    /// The type of the key material.
    /// Currently only one type is supported: "PKMT1"
    #[serde(rename = "keyMaterialType")]
    pub key_material_type: String,

    /// Whether key material is stored inline in this JSON data or in an external file
    #[serde(rename = "internalStorage")]
    pub internal_storage: bool,

    /// If internal storage is false, a reference to the external key material file
    #[serde(rename = "keyReference", skip_serializing_if = "Option::is_none")]
    pub key_reference: Option<String>,

    /// Whether the material belongs to a file footer key
    #[serde(rename = "isFooterKey")]
    pub is_footer_key: bool,

    /// The KMS instance ID. Only written for footer key material
    #[serde(rename = "kmsInstanceID", skip_serializing_if = "Option::is_none")]
    pub kms_instance_id: Option<String>,

    /// The KMS instance URL. Only written for footer key material
    #[serde(rename = "kmsInstanceURL", skip_serializing_if = "Option::is_none")]
    pub kms_instance_url: Option<String>,

    /// An identifier for the master key used to generate the key material
    #[serde(rename = "masterKeyID")]
    pub master_key_id: String,

    /// The wrapped data encryption key
    #[serde(rename = "wrappedDEK")]
    pub wrapped_dek: String,

    /// Whether double wrapping is used, where data encryption keys are wrapped
    /// with a key encryption key, which in turn is wrapped with the master key.
    /// If false (single wrapping), data encryption keys are wrapped directly with the master key.
    #[serde(rename = "doubleWrapping")]
    pub double_wrapping: bool,

    /// The identifier of the key encryption key used to wrap the data encryption key.
    /// Only written in double wrapping mode.
    #[serde(rename = "keyEncryptionKeyID", skip_serializing_if = "Option::is_none")]
    pub key_encryption_key_id: Option<String>,

    /// The wrapped key encryption key. Only written in double wrapping mode.
    #[serde(rename = "wrappedKEK", skip_serializing_if = "Option::is_none")]
    pub wrapped_kek: Option<String>,
}

/// Builder for [`KeyMaterial`]
pub struct KeyMaterialBuilder {
    is_footer_key: bool,
    kms_instance_id: Option<String>,
    kms_instance_url: Option<String>,
    master_key_id: Option<String>,
    wrapped_dek: Option<String>,
    double_wrapping: bool,
    key_encryption_key_id: Option<String>,
    wrapped_kek: Option<String>,
}

impl KeyMaterialBuilder {
    /// Start building key material for a footer key, which records the KMS
    /// instance that wrapped it
    pub fn for_footer_key(kms_instance_id: String, kms_instance_url: String) -> Self {
        Self {
            is_footer_key: true,
            kms_instance_id: Some(kms_instance_id),
            kms_instance_url: Some(kms_instance_url),
            master_key_id: None,
            wrapped_dek: None,
            double_wrapping: false,
            key_encryption_key_id: None,
            wrapped_kek: None,
        }
    }

    /// Start building key material for a column key
    pub fn for_column_key() -> Self {
        Self {
            is_footer_key: false,
            kms_instance_id: None,
            kms_instance_url: None,
            master_key_id: None,
            wrapped_dek: None,
            double_wrapping: false,
            key_encryption_key_id: None,
            wrapped_kek: None,
        }
    }

    /// Record a data encryption key wrapped directly with the master key
    pub fn with_single_wrapped_key(mut self, master_key_id: String, wrapped_dek: String) -> Self {
        self.double_wrapping = false;
        self.master_key_id = Some(master_key_id);
        self.wrapped_dek = Some(wrapped_dek);
        self
    }

    /// Record a data encryption key wrapped with a key encryption key,
    /// which is itself wrapped with the master key
    pub fn with_double_wrapped_key(
        mut self,
        master_key_id: String,
        key_encryption_key_id: String,
        wrapped_kek: String,
        wrapped_dek: String,
    ) -> Self {
        self.double_wrapping = true;
        self.master_key_id = Some(master_key_id);
        self.key_encryption_key_id = Some(key_encryption_key_id);
        self.wrapped_kek = Some(wrapped_kek);
        self.wrapped_dek = Some(wrapped_dek);
        self
    }

    /// Finalize the builder and return the created [`KeyMaterial`]
    pub fn build(self) -> Result<KeyMaterial> {
        if let (Some(master_key_id), Some(wrapped_dek)) = (self.master_key_id, self.wrapped_dek) {
            Ok(KeyMaterial {
                key_material_type: KEY_MATERIAL_TYPE.to_string(),
                internal_storage: true,
                key_reference: None,
                is_footer_key: self.is_footer_key,
                kms_instance_id: self.kms_instance_id,
                kms_instance_url: self.kms_instance_url,
                master_key_id,
                wrapped_dek,
                double_wrapping: self.double_wrapping,
                key_encryption_key_id: self.key_encryption_key_id,
                wrapped_kek: self.wrapped_kek,
            })
        } else {
            Err(key_material_err!(
                "Wrapped key not set when building key material"
            ))
        }
    }
}

impl KeyMaterial {
    /// Parse key material from its JSON form, accepting fields in any order
    pub fn deserialize(key_material: &str) -> Result<Self> {
        let material: KeyMaterial = serde_json::from_str(key_material).map_err(|e| {
            key_material_err!("Error deserializing JSON encryption key material: {}", e)
        })?;
        material.validate()?;
        Ok(material)
    }

    /// Serialize the key material to its JSON form
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| key_material_err!("Error serializing key material to JSON: {}", e))
    }

    fn validate(&self) -> Result<()> {
        if self.key_material_type != KEY_MATERIAL_TYPE {
            return Err(EncryptionError::MalformedKeyMaterial(format!(
                "Unsupported key material type: {} vs {}",
                self.key_material_type, KEY_MATERIAL_TYPE
            )));
        }
        if self.is_footer_key
            && (self.kms_instance_id.is_none() || self.kms_instance_url.is_none())
        {
            return Err(key_material_err!(
                "Footer key material must carry the KMS instance ID and URL"
            ));
        }
        if self.double_wrapping {
            if self.key_encryption_key_id.is_none() || self.wrapped_kek.is_none() {
                return Err(key_material_err!(
                    "Key uses double wrapping but key encryption key is not set"
                ));
            }
            // A double-wrapped DEK was encrypted locally with the KEK, so it
            // is always a base64 envelope. Wrapped KEKs and single-wrapped
            // DEKs are opaque strings produced by the KMS client.
            BASE64_STANDARD
                .decode(&self.wrapped_dek)
                .map_err(|e| key_material_err!("Could not base64 decode wrapped DEK: {}", e))?;
            if let Some(kek_id) = &self.key_encryption_key_id {
                BASE64_STANDARD.decode(kek_id).map_err(|e| {
                    key_material_err!("Could not base64 decode key encryption key id: {}", e)
                })?;
            }
        }
        Ok(())
    }
}

/// The key metadata stored in a Parquet file. With internal storage the
/// metadata is the key material itself; with external storage it is a
/// reference to a key in an external material store.
#[derive(Debug, PartialEq)]
pub enum KeyMetadata {
    /// Key material stored inline in the key metadata
    Internal(KeyMaterial),
    /// A reference to key material in an external store
    External(String),
}

#[derive(Deserialize)]
struct KeyMetadataHeader {
    #[serde(rename = "keyMaterialType")]
    key_material_type: String,
    #[serde(rename = "internalStorage", default = "default_internal_storage")]
    internal_storage: bool,
    #[serde(rename = "keyReference")]
    key_reference: Option<String>,
}

fn default_internal_storage() -> bool {
    true
}

impl KeyMetadata {
    /// Parse the key metadata stored in a file, distinguishing inline key
    /// material from references to an external store
    pub fn parse(key_metadata: &str) -> Result<Self> {
        let header: KeyMetadataHeader = serde_json::from_str(key_metadata)
            .map_err(|e| key_material_err!("Error deserializing JSON key metadata: {}", e))?;
        if header.key_material_type != KEY_MATERIAL_TYPE {
            return Err(EncryptionError::MalformedKeyMaterial(format!(
                "Unsupported key material type: {} vs {}",
                header.key_material_type, KEY_MATERIAL_TYPE
            )));
        }
        if header.internal_storage {
            Ok(KeyMetadata::Internal(KeyMaterial::deserialize(
                key_metadata,
            )?))
        } else {
            match header.key_reference {
                Some(key_reference) => Ok(KeyMetadata::External(key_reference)),
                None => Err(key_material_err!(
                    "Key metadata with external storage must carry a key reference"
                )),
            }
        }
    }

    /// Serialized key metadata pointing at external key material.
    /// With internal storage, key metadata and key material are the same and
    /// [`KeyMaterial::serialize`] is used directly.
    pub fn create_serialized_for_external_material(key_reference: &str) -> Result<String> {
        let metadata = serde_json::json!({
            "keyMaterialType": KEY_MATERIAL_TYPE,
            "internalStorage": false,
            "keyReference": key_reference,
        });
        serde_json::to_string(&metadata)
            .map_err(|e| key_material_err!("Error serializing key metadata to JSON: {}", e))
    }
}
