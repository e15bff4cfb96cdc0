//! Encrypted item codec.
//!
//! `encode` serializes an item to canonical JSON and seals it with
//! AES-256-GCM under the vault key, using a fresh nonce every time.
//! `decode` checks the authentication tag before anything is parsed.
//!
//! The `_bound` variants additionally authenticate a context (the item's
//! storage id) so an item file only decodes in the slot it was written to.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::format::{seal, unseal, ITEM_MAGIC, MANIFEST_MAGIC};
use super::item::{validate_name, validate_tag, Item};
use crate::crypto::VaultKey;
use crate::errors::{Result, VaultError};

/// Context authenticated with the manifest envelope.
const MANIFEST_CONTEXT: &[u8] = b"manifest";

/// Canonical plaintext form of an item.
///
/// Tags and field keys are sorted, so equal items give equal bytes.
pub fn canonical_bytes(item: &Item) -> Result<Vec<u8>> {
    serde_json::to_vec(item).map_err(|e| VaultError::SerializationError(format!("item: {e}")))
}

/// Encrypt an item with no slot binding.
pub fn encode(item: &Item, key: &VaultKey) -> Result<Vec<u8>> {
    encode_bound(item, key, &[])
}

/// Decrypt an item produced by `encode`.
pub fn decode(blob: &[u8], key: &VaultKey) -> Result<Item> {
    decode_bound(blob, key, &[])
}

/// Encrypt an item, binding it to `context`.
pub fn encode_bound(item: &Item, key: &VaultKey, context: &[u8]) -> Result<Vec<u8>> {
    let plaintext = zeroize::Zeroizing::new(canonical_bytes(item)?);
    seal(ITEM_MAGIC, &plaintext, key, context)
}

/// Decrypt an item that was encoded with the same `context`.
///
/// `AuthenticationFailure` means wrong key or tampered bytes; `Corrupt`
/// means the bytes were authentic but do not describe a valid item.
pub fn decode_bound(blob: &[u8], key: &VaultKey, context: &[u8]) -> Result<Item> {
    let item: Item = open_json(ITEM_MAGIC, blob, key, context)?;

    validate_name(&item.name).map_err(|e| VaultError::Corrupt(e.to_string()))?;
    for tag in &item.tags {
        validate_tag(tag).map_err(|e| VaultError::Corrupt(e.to_string()))?;
    }
    Ok(item)
}

/// Seal any serializable manifest value.
pub(crate) fn encode_manifest<T: Serialize>(value: &T, key: &VaultKey) -> Result<Vec<u8>> {
    let plaintext = zeroize::Zeroizing::new(
        serde_json::to_vec(value)
            .map_err(|e| VaultError::SerializationError(format!("manifest: {e}")))?,
    );
    seal(MANIFEST_MAGIC, &plaintext, key, MANIFEST_CONTEXT)
}

/// Open a manifest sealed by `encode_manifest`.
pub(crate) fn decode_manifest<T: DeserializeOwned>(blob: &[u8], key: &VaultKey) -> Result<T> {
    open_json(MANIFEST_MAGIC, blob, key, MANIFEST_CONTEXT)
}

fn open_json<T: DeserializeOwned>(
    magic: &[u8; 4],
    blob: &[u8],
    key: &VaultKey,
    context: &[u8],
) -> Result<T> {
    let plaintext = zeroize::Zeroizing::new(unseal(magic, blob, key, context)?);
    serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::Corrupt(format!("authentic payload does not parse: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::item::Content;

    fn key() -> VaultKey {
        VaultKey::from_bytes([0x17u8; 32])
    }

    fn wifi() -> Item {
        Item::new(
            "wifi",
            ["home", "network"],
            [("ssid", "NET1"), ("psk", "secret")],
        )
        .unwrap()
    }

    #[test]
    fn encode_decode_roundtrip() {
        let blob = encode(&wifi(), &key()).unwrap();
        assert_eq!(decode(&blob, &key()).unwrap(), wifi());
    }

    #[test]
    fn roundtrip_covers_every_content_shape() {
        for content in [
            Content::Text(String::new()),
            Content::Text("multi\nline note".into()),
            Content::Bytes(vec![0, 255, 128]),
            Content::Fields(Default::default()),
        ] {
            let item = Item::new("n", Vec::<String>::new(), content).unwrap();
            let blob = encode(&item, &key()).unwrap();
            assert_eq!(decode(&blob, &key()).unwrap(), item);
        }
    }

    #[test]
    fn canonical_bytes_ignore_tag_insertion_order() {
        let a = Item::new("x", ["b", "a", "c"], "v").unwrap();
        let b = Item::new("x", ["c", "b", "a"], "v").unwrap();
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn reencoding_uses_a_fresh_nonce() {
        let first = encode(&wifi(), &key()).unwrap();
        let second = encode(&wifi(), &key()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn flipping_any_bit_fails_authentication() {
        let item = Item::new("k", ["t"], "v").unwrap();
        let blob = encode_bound(&item, &key(), b"slot").unwrap();

        for byte in 0..blob.len() {
            for bit in 0..8 {
                let mut tampered = blob.clone();
                tampered[byte] ^= 1 << bit;
                let err = decode_bound(&tampered, &key(), b"slot").unwrap_err();
                assert!(
                    err.is_authentication_failure(),
                    "byte {byte} bit {bit} gave {err:?}"
                );
            }
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let blob = encode(&wifi(), &key()).unwrap();
        let other = VaultKey::from_bytes([0x18u8; 32]);
        assert!(decode(&blob, &other).unwrap_err().is_authentication_failure());
    }

    #[test]
    fn bound_item_does_not_decode_in_another_slot() {
        let blob = encode_bound(&wifi(), &key(), b"slot-a").unwrap();
        assert!(decode_bound(&blob, &key(), b"slot-b").is_err());
        assert!(decode(&blob, &key()).is_err());
    }

    #[test]
    fn authentic_garbage_is_corrupt_not_auth_failure() {
        let blob = seal(ITEM_MAGIC, b"not json", &key(), b"").unwrap();
        assert!(matches!(decode(&blob, &key()), Err(VaultError::Corrupt(_))));

        let nameless = seal(
            ITEM_MAGIC,
            br#"{"name":"","tags":[],"content":{"kind":"text","value":""}}"#,
            &key(),
            b"",
        )
        .unwrap();
        assert!(matches!(
            decode(&nameless, &key()),
            Err(VaultError::Corrupt(_))
        ));
    }
}
