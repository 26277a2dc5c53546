//! Property-based tests for GPU query schema decoding

use nodestat_core::{GpuField, GpuQuerySchema, GpuValue, GpuValueType};
use proptest::prelude::*;

/// One column: its declared type, the raw text and the expected value
#[derive(Debug, Clone)]
struct Column {
    value_type: GpuValueType,
    raw: String,
    expected: GpuValue,
}

fn arb_column() -> impl Strategy<Value = Column> {
    prop_oneof![
        any::<i64>().prop_map(|v| Column {
            value_type: GpuValueType::Int,
            raw: v.to_string(),
            expected: GpuValue::Int(v),
        }),
        (-1_000_000i64..1_000_000, 0u32..1000).prop_map(|(whole, frac)| {
            let raw = format!("{whole}.{frac:03}");
            let value: f64 = raw.parse().unwrap();
            Column {
                value_type: GpuValueType::Float,
                raw,
                expected: GpuValue::Float(value),
            }
        }),
        "[A-Za-z0-9._-][A-Za-z0-9 ._-]{0,23}".prop_map(|s| Column {
            value_type: GpuValueType::String,
            raw: s.clone(),
            expected: GpuValue::Text(s),
        }),
        Just(Column {
            value_type: GpuValueType::Int,
            raw: "[N/A]".to_string(),
            expected: GpuValue::Unavailable,
        }),
    ]
}

fn schema_for(columns: &[Column]) -> GpuQuerySchema {
    let fields = columns
        .iter()
        .enumerate()
        .map(|(i, c)| GpuField::new(format!("field.{i}"), format!("key{i}"), c.value_type))
        .collect();
    GpuQuerySchema::new(fields).unwrap()
}

fn row(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| c.raw.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// N fields and N columns give exactly the N keys, in order, coerced
    #[test]
    fn prop_row_yields_every_key(columns in prop::collection::vec(arb_column(), 1..12)) {
        let schema = schema_for(&columns);
        let record = schema.decode_row(&row(&columns)).unwrap();

        prop_assert_eq!(record.len(), columns.len());
        for (i, ((key, value), column)) in record.iter().zip(&columns).enumerate() {
            prop_assert_eq!(key, format!("key{i}"));
            prop_assert_eq!(value, &column.expected);
        }
    }

    /// A column count that differs from the schema is a parse failure
    #[test]
    fn prop_extra_column_rejected(columns in prop::collection::vec(arb_column(), 1..12)) {
        let schema = schema_for(&columns);
        let line = format!("{}, 0", row(&columns));
        prop_assert!(schema.decode_row(&line).is_err());
    }

    /// One record per non-blank line, in device order
    #[test]
    fn prop_one_record_per_device(
        columns in prop::collection::vec(arb_column(), 1..6),
        devices in 0usize..8,
    ) {
        let schema = schema_for(&columns);
        let line = row(&columns);
        let output: String = (0..devices).map(|_| format!("{line}\n\n")).collect();

        let records = schema.decode(&output).unwrap();
        prop_assert_eq!(records.len(), devices);
    }

    /// The query names every field in schema order
    #[test]
    fn prop_command_lists_fields_in_order(columns in prop::collection::vec(arb_column(), 1..12)) {
        let schema = schema_for(&columns);
        let expected: Vec<String> = (0..columns.len()).map(|i| format!("field.{i}")).collect();
        prop_assert_eq!(schema.query_fields(), expected.join(","));
        prop_assert!(schema.command().ends_with("--format=csv,noheader,nounits"));
    }
}
