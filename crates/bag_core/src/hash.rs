//! Content hashing.
//!
//! The content hash of an entity is SHA-256 over the canonical CBOR map
//! `{"label": label, "properties": user_properties}`, rendered as lowercase
//! hex. Reserved meta properties never take part, so a stored record and the
//! value a client wrote hash identically.

use crate::entity::{properties_to_value, user_properties, Properties};
use bag_codec::{to_canonical_cbor, Value};
use sha2::{Digest, Sha256};

/// Computes the content hash of a label and property map.
pub fn content_hash(label: &str, properties: &Properties) -> String {
    let value = Value::map(vec![
        (Value::text("label"), Value::text(label)),
        (
            Value::text("properties"),
            properties_to_value(&user_properties(properties)),
        ),
    ]);
    let digest = Sha256::digest(to_canonical_cbor(&value));
    to_hex(&digest)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{PropertyValue, HASH_PROPERTY, SNAPSHOT_PROPERTY};

    fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn hash_is_hex_sha256() {
        let hash = content_hash("Person", &Properties::new());
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_is_deterministic() {
        let p = props(&[("name", "Alice".into()), ("age", 30.into())]);
        assert_eq!(content_hash("Person", &p), content_hash("Person", &p.clone()));
    }

    #[test]
    fn hash_covers_label_and_values() {
        let p = props(&[("name", "Alice".into())]);
        let q = props(&[("name", "Bob".into())]);
        assert_ne!(content_hash("Person", &p), content_hash("Robot", &p));
        assert_ne!(content_hash("Person", &p), content_hash("Person", &q));
    }

    #[test]
    fn hash_ignores_meta_properties() {
        let plain = props(&[("name", "Alice".into())]);
        let stored = props(&[
            ("name", "Alice".into()),
            (HASH_PROPERTY, "deadbeef".into()),
            (SNAPSHOT_PROPERTY, 12.into()),
        ]);
        assert_eq!(content_hash("Person", &plain), content_hash("Person", &stored));
    }

    #[test]
    fn value_types_are_distinguished() {
        let text = props(&[("x", "1".into())]);
        let int = props(&[("x", 1.into())]);
        assert_ne!(content_hash("N", &text), content_hash("N", &int));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn properties() -> impl Strategy<Value = Properties> {
            prop::collection::btree_map(
                "[a-z]{1,6}",
                prop_oneof![
                    any::<i64>().prop_map(PropertyValue::from),
                    "[a-zA-Z ]{0,8}".prop_map(PropertyValue::from),
                    any::<bool>().prop_map(PropertyValue::from),
                ],
                0..5,
            )
        }

        proptest! {
            #[test]
            fn meta_properties_never_change_the_hash(
                label in "[A-Z][a-z]{0,6}",
                user in properties(),
                hash in "[0-9a-f]{8}",
                snapshot in any::<i64>(),
            ) {
                let mut stored = user.clone();
                stored.insert(HASH_PROPERTY.to_string(), hash.into());
                stored.insert(SNAPSHOT_PROPERTY.to_string(), snapshot.into());
                prop_assert_eq!(content_hash(&label, &user), content_hash(&label, &stored));
            }
        }
    }
}
