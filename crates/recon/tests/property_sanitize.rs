// Property-based tests for row sanitization and duplicate scanning.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;
use ordrecon_recon::config::ReconConfig;
use ordrecon_recon::model::{RawRow, ReconciliationRecord, StoredRecord, ValidationOutcome};
use ordrecon_recon::sanitize::{parse_numeric, sanitize_row, NumericError};
use ordrecon_recon::true_dup::group_true_duplicates;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Cell text: mostly numeric-looking, sometimes text, sometimes blank.
fn arb_cell() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => r"-?[0-9]{1,12}(\.[0-9]{1,3})?",
        1 => r"[a-zA-Z0-9 .,-]{0,12}",
        1 => Just("".to_string()),
        1 => Just("   ".to_string()),
    ]
}

fn arb_row() -> impl Strategy<Value = RawRow> {
    (arb_cell(), arb_cell(), arb_cell(), arb_cell()).prop_map(|(order, material, sales, year)| {
        RawRow::from_pairs([
            ("ORDERNUMBER", order),
            ("MATERIAL_NUMBER", material),
            ("SALES_DOCUMENT", sales),
            ("YEAR", year),
        ])
    })
}

fn arb_stored() -> impl Strategy<Value = Vec<StoredRecord>> {
    let record = (
        prop::sample::select(vec!["A1", "A2", "A3"]),
        prop::option::of(prop::sample::select(vec!["M1", "M2"])),
        prop::option::of(prop::sample::select(vec!["B1", "B2", "B3"])),
        prop::option::of(prop::sample::select(vec!["OPEN", "SHIPPED"])),
    );
    proptest::collection::vec(record, 0..24).prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (order, material, batch, status))| {
                let mut record = ReconciliationRecord::new(order, "system");
                record.material_number = material.map(String::from);
                record.batch_number = batch.map(String::from);
                record.status = status.map(String::from);
                StoredRecord { id: i as i64 + 1, record }
            })
            .collect()
    })
}

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn valid_iff_order_present_and_numerics_parse(row in arb_row()) {
        let config = ReconConfig::default();
        let order_ok = !row.get("ORDERNUMBER").unwrap_or("").trim().is_empty();
        let numeric_ok = |col: &str, fits_i32: bool| match row.value(col) {
            None => true,
            Some(v) if fits_i32 => parse_numeric::<i32>(v).is_ok(),
            Some(v) => parse_numeric::<i64>(v).is_ok(),
        };
        let expect_valid = order_ok && numeric_ok("SALES_DOCUMENT", false) && numeric_ok("YEAR", true);

        match sanitize_row(2, &row, &config) {
            ValidationOutcome::Valid(record) => {
                prop_assert!(expect_valid);
                prop_assert_eq!(record.order_number.as_str(), record.order_number.trim());
                prop_assert!(!record.order_number.is_empty());
                if row.value("YEAR").is_none() {
                    prop_assert_eq!(record.year, None);
                }
                if row.value("SALES_DOCUMENT").is_none() {
                    prop_assert_eq!(record.sales_document, None);
                }
            }
            ValidationOutcome::Rejected(rejection) => {
                prop_assert!(!expect_valid);
                prop_assert_eq!(rejection.row, 2);
                prop_assert!(!rejection.reasons.is_empty());
            }
        }
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn integers_parse_exactly(n in any::<i64>(), zeros in 0usize..4) {
        prop_assert_eq!(parse_numeric::<i64>(&n.to_string()), Ok(n));
        if zeros > 0 {
            let padded = format!("{n}.{}", "0".repeat(zeros));
            prop_assert_eq!(parse_numeric::<i64>(&padded), Ok(n));
        }
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn fractions_are_never_integers(n in -100_000i64..100_000, frac in 1u32..1000) {
        let text = format!("{n}.{frac:03}");
        prop_assert_eq!(parse_numeric::<i64>(&text), Err(NumericError::NotInteger));
    }
}

// ---------------------------------------------------------------------------
// True-duplicate grouping
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn groups_are_ordered_and_qualified(records in arb_stored()) {
        let total = records.len();
        let groups = group_true_duplicates(records.clone());

        let mut reported = 0;
        for window in groups.windows(2) {
            prop_assert!(window[0].identity < window[1].identity);
        }
        for group in &groups {
            prop_assert!(group.members.len() > 1);
            let first = &group.members[0].record.batch_number;
            prop_assert!(group.members.iter().any(|m| &m.record.batch_number != first));
            for pair in group.members.windows(2) {
                let a = (&pair[0].record.batch_number, &pair[0].record.status, pair[0].id);
                let b = (&pair[1].record.batch_number, &pair[1].record.status, pair[1].id);
                prop_assert!(a < b);
            }
            reported += group.members.len();
        }
        prop_assert!(reported <= total);

        // input order does not change the output
        let mut reversed = records;
        reversed.reverse();
        let again = group_true_duplicates(reversed);
        let ids = |g: &[ordrecon_recon::model::DuplicateGroup<StoredRecord>]| {
            g.iter().flat_map(|g| g.members.iter().map(|m| m.id)).collect::<Vec<_>>()
        };
        prop_assert_eq!(ids(groups.as_slice()), ids(again.as_slice()));
    }
}
