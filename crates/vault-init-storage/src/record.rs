//! The initialization record and its storage encoding.
//!
//! A record is kept as two named byte fields: the root token under
//! [`ROOT_KEY_FIELD`] and the comma-joined key shares under
//! [`UNSEAL_KEYS_FIELD`]. Both values are base64 text so that any byte
//! sequence survives the backing store unchanged.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::StorageError;

/// Field holding the encoded root token.
pub const ROOT_KEY_FIELD: &str = "root_key";

/// Field holding the encoded, delimiter-joined key shares.
pub const UNSEAL_KEYS_FIELD: &str = "unseal_keys";

/// Separator placed between key shares.
pub const KEY_DELIMITER: char = ',';

/// Byte-field map as stored by a backend.
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Output of a one-time vault initialization: ordered key shares and the root
/// token. Shares are replayed in this order during unseal.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct InitializationRecord {
    /// Opaque unseal key shares, in the order the vault returned them.
    pub keys: Vec<String>,
    /// Root token issued at initialization.
    pub root_token: String,
}

impl InitializationRecord {
    /// Build a record from its shares and root token.
    #[must_use]
    pub fn new(keys: Vec<String>, root_token: String) -> Self {
        Self { keys, root_token }
    }
}

impl std::fmt::Debug for InitializationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationRecord")
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .field("root_token", &"[redacted]")
            .finish()
    }
}

/// Encode a record into its two-field storage form.
///
/// # Errors
///
/// Returns [`StorageError::Encoding`] if a key share contains
/// [`KEY_DELIMITER`], or if the only share is empty. Neither would decode
/// back to the same record.
pub fn encode(record: &InitializationRecord) -> Result<SecretData, StorageError> {
    if let Some(index) = record.keys.iter().position(|k| k.contains(KEY_DELIMITER)) {
        return Err(StorageError::Encoding {
            reason: format!("key share {index} contains the delimiter '{KEY_DELIMITER}'"),
        });
    }

    if matches!(record.keys.as_slice(), [only] if only.is_empty()) {
        return Err(StorageError::Encoding {
            reason: "a single empty key share would decode as no shares".to_owned(),
        });
    }

    let joined = record.keys.join(&KEY_DELIMITER.to_string());

    let mut data = SecretData::new();
    data.insert(
        ROOT_KEY_FIELD.to_owned(),
        BASE64.encode(record.root_token.as_bytes()).into_bytes(),
    );
    data.insert(
        UNSEAL_KEYS_FIELD.to_owned(),
        BASE64.encode(joined.as_bytes()).into_bytes(),
    );
    Ok(data)
}

/// Decode the storage form back into a record.
///
/// # Errors
///
/// Returns [`StorageError::Corrupt`] if a field is missing, is not valid
/// base64, or does not decode to UTF-8.
pub fn decode(data: &SecretData) -> Result<InitializationRecord, StorageError> {
    let root_token = decode_field(data, ROOT_KEY_FIELD)?;
    let joined = decode_field(data, UNSEAL_KEYS_FIELD)?;

    let keys = if joined.is_empty() {
        Vec::new()
    } else {
        joined.split(KEY_DELIMITER).map(str::to_owned).collect()
    };

    Ok(InitializationRecord { keys, root_token })
}

fn decode_field(data: &SecretData, field: &str) -> Result<String, StorageError> {
    let raw = data.get(field).ok_or_else(|| StorageError::Corrupt {
        reason: format!("missing field '{field}'"),
    })?;
    let bytes = BASE64.decode(raw).map_err(|e| StorageError::Corrupt {
        reason: format!("field '{field}' is not valid base64: {e}"),
    })?;
    String::from_utf8(bytes).map_err(|e| StorageError::Corrupt {
        reason: format!("field '{field}' is not valid UTF-8: {e}"),
    })
}
