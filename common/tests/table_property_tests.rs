// Property-based tests for the enrichment table operations

use common::table::{key_string, Table};
use proptest::prelude::*;
use regex::Regex;
use serde_json::{json, Value};

fn key_cell() -> impl Strategy<Value = Value> {
    prop_oneof![
        (1000u32..1010).prop_map(|n| json!(n as f64)),
        (1000u32..1010).prop_map(|n| json!(format!("{}.0", n))),
        (1000u32..1010).prop_map(|n| json!(n.to_string())),
        "[A-Z]{2}-[0-9]".prop_map(|s| json!(s)),
        Just(Value::Null),
    ]
}

fn rejections(keys: &[Value]) -> Table {
    let mut table = Table::new(vec!["Client Id".to_string(), "Row".to_string()]);
    for (i, key) in keys.iter().enumerate() {
        table.push_row(vec![key.clone(), json!(i)]);
    }
    table
}

proptest! {
    // Integral ids collapse to the same key however the spreadsheet stored them
    #[test]
    fn property_integral_ids_normalize_to_digits(n in 0u64..1_000_000_000) {
        let expected = n.to_string();
        prop_assert_eq!(key_string(&json!(n)), expected.clone());
        prop_assert_eq!(key_string(&json!(n as f64)), expected.clone());
        prop_assert_eq!(key_string(&json!(format!("{}.0", n))), expected);
    }

    // Rows kept by the filter are exactly those whose key starts with a digit
    #[test]
    fn property_retain_matching_partitions_rows(keys in proptest::collection::vec(key_cell(), 0..20)) {
        let pattern = Regex::new(r"^\d").unwrap();
        let mut table = rejections(&keys);
        table.normalize_key_column("Client Id").unwrap();
        let dropped = table.retain_matching("Client Id", &pattern).unwrap();

        let expected_kept = keys
            .iter()
            .filter(|k| pattern.is_match(&key_string(k)))
            .count();
        prop_assert_eq!(table.len(), expected_kept);
        prop_assert_eq!(dropped, keys.len() - expected_kept);
        for row in &table.rows {
            prop_assert!(pattern.is_match(&key_string(&row[0])));
        }
    }

    // Join size is the number of matching (left, right) pairs, in left order
    #[test]
    fn property_inner_join_pairs(
        keys in proptest::collection::vec(key_cell(), 0..15),
        accounts in proptest::collection::vec(1000u32..1010, 0..10),
    ) {
        let mut left = rejections(&keys);
        left.normalize_key_column("Client Id").unwrap();

        let mut right = Table::new(vec!["accountnumber".to_string(), "name".to_string()]);
        for id in &accounts {
            right.push_row(vec![json!(id.to_string()), json!(format!("Customer {}", id))]);
        }

        let joined = left.inner_join("Client Id", &right, "accountnumber").unwrap();
        let expected: usize = left
            .rows
            .iter()
            .map(|row| {
                let key = key_string(&row[0]);
                accounts.iter().filter(|id| id.to_string() == key).count()
            })
            .sum();
        prop_assert_eq!(joined.len(), expected);
        prop_assert_eq!(joined.headers.len(), 4);

        let order: Vec<Value> = joined.rows.iter().map(|r| r[1].clone()).collect();
        let mut sorted = order.clone();
        sorted.sort_by_key(|v| v.as_u64());
        prop_assert_eq!(order, sorted);
    }
}
