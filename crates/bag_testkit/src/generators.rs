//! Property-based test generators using proptest.
//!
//! Strategies produce entities small enough to keep shrinking fast while
//! still colliding often, so updates and deletes hit earlier creates.

use bag_core::{
    NodeStorage, Operand, Properties, PropertyValue, RelationshipStorage, Timestamp,
    TransactionState,
};
use proptest::prelude::*;

/// Strategy for node and relationship labels.
pub fn label_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["Person", "City", "Company", "KNOWS", "LIVES_IN"])
        .prop_map(str::to_string)
}

/// Strategy for property values.
pub fn property_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        any::<bool>().prop_map(PropertyValue::Bool),
        (-1000i64..1000).prop_map(PropertyValue::Integer),
        prop::string::string_regex("[a-z]{0,8}")
            .expect("Invalid regex")
            .prop_map(PropertyValue::Text),
    ]
}

/// Strategy for user property maps. Reserved names never appear.
pub fn properties_strategy() -> impl Strategy<Value = Properties> {
    prop::collection::btree_map(
        prop::sample::select(vec!["name", "age", "active", "city", "since"])
            .prop_map(str::to_string),
        property_value_strategy(),
        0..4,
    )
}

/// Strategy for nodes.
pub fn node_strategy() -> impl Strategy<Value = NodeStorage> {
    (label_strategy(), properties_strategy())
        .prop_map(|(label, properties)| NodeStorage::with_properties(label, properties))
}

/// Strategy for relationships.
pub fn relationship_strategy() -> impl Strategy<Value = RelationshipStorage> {
    (
        label_strategy(),
        properties_strategy(),
        node_strategy(),
        node_strategy(),
    )
        .prop_map(|(label, properties, start, end)| {
            RelationshipStorage::with_properties(label, properties, start, end)
        })
}

/// Strategy for operands of either kind.
pub fn operand_strategy() -> impl Strategy<Value = Operand> {
    prop_oneof![
        3 => node_strategy().prop_map(Operand::Node),
        1 => relationship_strategy().prop_map(Operand::Relationship),
    ]
}

/// One buffered write as a `(identifier, value)` pair, following the
/// `write` convention: no identifier creates, no value deletes.
pub fn write_strategy() -> impl Strategy<Value = (Option<Operand>, Option<Operand>)> {
    prop_oneof![
        operand_strategy().prop_map(|value| (None, Some(value))),
        operand_strategy().prop_map(|id| (Some(id), None)),
        (node_strategy(), node_strategy())
            .prop_map(|(id, value)| (Some(id.into()), Some(value.into()))),
        (relationship_strategy(), relationship_strategy())
            .prop_map(|(id, value)| (Some(id.into()), Some(value.into()))),
    ]
}

/// Strategy for transactions built from a sequence of writes and reads.
/// Writes refused by the transaction are skipped.
pub fn transaction_strategy() -> impl Strategy<Value = TransactionState> {
    (
        0i64..1_000,
        prop::collection::vec(write_strategy(), 0..12),
        prop::collection::vec(operand_strategy(), 0..4),
    )
        .prop_map(|(ts, writes, reads)| {
            let mut txn = TransactionState::new(Timestamp::new(ts));
            for read in reads {
                txn.record_read(read);
            }
            for write in writes {
                let _ = match write {
                    (None, Some(value)) => txn.create(value),
                    (Some(id), None) => {
                        txn.delete(id);
                        Ok(())
                    }
                    (Some(id), Some(value)) => txn.update(id, value),
                    (None, None) => Ok(()),
                };
            }
            txn
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bag_core::is_reserved_property;

    proptest! {
        #[test]
        fn generated_properties_are_user_properties(props in properties_strategy()) {
            prop_assert!(props.keys().all(|k| !is_reserved_property(k)));
        }

        #[test]
        fn generated_transactions_respect_delete_supersedes(txn in transaction_strategy()) {
            for deleted in txn.nodes().deletes() {
                prop_assert!(!txn.nodes().updates().contains_key(deleted));
                prop_assert!(!txn.nodes().creates().contains(deleted));
            }
            for deleted in txn.relationships().deletes() {
                prop_assert!(!txn.relationships().updates().contains_key(deleted));
                prop_assert!(!txn.relationships().creates().contains(deleted));
            }
        }
    }
}
