//! Derived (calculated) columns.
//!
//! A [`DerivedRegistry`] declares, once, which columns are computed and from what.
//! Specs run in registry order, and a formula may read the target of an earlier spec
//! (`discount` reads `product_value_in_usd`). Reading a later or own target is rejected
//! at construction, which is what makes [`DerivedRegistry::evaluate`] idempotent.
//!
//! Source values are read leniently: anything that does not start with a number counts
//! as zero, so a single malformed cell never blocks loading or editing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{GridError, Result};
use crate::types::{CellValue, ColumnKey, RowRecord};

/// The calculation behind one derived column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Formula {
    /// Product of all factors.
    Product { factors: Vec<ColumnKey> },
    /// `min(of × rate, cap)`.
    CappedShare { of: ColumnKey, rate: f64, cap: f64 },
    /// `minuend − subtrahend`.
    Difference {
        minuend: ColumnKey,
        subtrahend: ColumnKey,
    },
}

impl Formula {
    /// Columns this formula reads.
    #[must_use]
    pub fn inputs(&self) -> Vec<&ColumnKey> {
        match self {
            Self::Product { factors } => factors.iter().collect(),
            Self::CappedShare { of, .. } => vec![of],
            Self::Difference {
                minuend,
                subtrahend,
            } => vec![minuend, subtrahend],
        }
    }

    fn compute(&self, row: &RowRecord) -> f64 {
        let num = |key: &ColumnKey| parse_number(row.get(key.as_str()));
        match self {
            Self::Product { factors } => factors.iter().map(num).product(),
            Self::CappedShare { of, rate, cap } => (num(of) * rate).min(*cap),
            Self::Difference {
                minuend,
                subtrahend,
            } => num(minuend) - num(subtrahend),
        }
    }
}

/// One calculated column: where the result goes and how it is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedFieldSpec {
    pub target_key: ColumnKey,
    pub formula: Formula,
}

impl DerivedFieldSpec {
    #[must_use]
    pub fn new(target_key: impl Into<ColumnKey>, formula: Formula) -> Self {
        Self {
            target_key: target_key.into(),
            formula,
        }
    }

    /// Distinct columns read by this spec.
    #[must_use]
    pub fn source_keys(&self) -> BTreeSet<&ColumnKey> {
        self.formula.inputs().into_iter().collect()
    }
}

/// Ordered set of derived field specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DerivedFieldSpec>", into = "Vec<DerivedFieldSpec>")]
pub struct DerivedRegistry {
    specs: Vec<DerivedFieldSpec>,
}

impl TryFrom<Vec<DerivedFieldSpec>> for DerivedRegistry {
    type Error = GridError;

    fn try_from(specs: Vec<DerivedFieldSpec>) -> Result<Self> {
        Self::new(specs)
    }
}

impl From<DerivedRegistry> for Vec<DerivedFieldSpec> {
    fn from(registry: DerivedRegistry) -> Self {
        registry.specs
    }
}

impl Default for DerivedRegistry {
    fn default() -> Self {
        Self::invoice()
    }
}

impl DerivedRegistry {
    /// Validate and build a registry.
    ///
    /// # Errors
    /// [`GridError::InvalidRegistry`] if a target is declared twice or a formula reads
    /// its own target or the target of a later spec.
    pub fn new(specs: Vec<DerivedFieldSpec>) -> Result<Self> {
        let all_targets: BTreeSet<&ColumnKey> = specs.iter().map(|s| &s.target_key).collect();
        if all_targets.len() != specs.len() {
            return Err(GridError::InvalidRegistry(
                "duplicate target column".to_string(),
            ));
        }

        let mut defined: BTreeSet<&ColumnKey> = BTreeSet::new();
        for spec in &specs {
            for input in spec.formula.inputs() {
                if all_targets.contains(input) && !defined.contains(input) {
                    return Err(GridError::InvalidRegistry(format!(
                        "{} reads {input} before it is computed",
                        spec.target_key
                    )));
                }
            }
            defined.insert(&spec.target_key);
        }

        Ok(Self { specs })
    }

    /// A registry with no derived columns.
    #[must_use]
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    /// The invoice columns: product value, a 15% discount capped at 50, and net amount.
    #[must_use]
    pub fn invoice() -> Self {
        Self {
            specs: vec![
                DerivedFieldSpec::new(
                    "product_value_in_usd",
                    Formula::Product {
                        factors: vec![
                            "rate_in_usd".into(),
                            "total_no_of_boxes".into(),
                            "total_qty".into(),
                        ],
                    },
                ),
                DerivedFieldSpec::new(
                    "discount",
                    Formula::CappedShare {
                        of: "product_value_in_usd".into(),
                        rate: 0.15,
                        cap: 50.0,
                    },
                ),
                DerivedFieldSpec::new(
                    "net_amount",
                    Formula::Difference {
                        minuend: "product_value_in_usd".into(),
                        subtrahend: "discount".into(),
                    },
                ),
            ],
        }
    }

    #[must_use]
    pub fn specs(&self) -> &[DerivedFieldSpec] {
        &self.specs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Whether `key` is a calculated column. Calculated columns are never editable.
    #[must_use]
    pub fn is_target(&self, key: &str) -> bool {
        self.specs.iter().any(|s| s.target_key.as_str() == key)
    }

    /// Whether a change to `key` requires recalculation.
    #[must_use]
    pub fn is_source(&self, key: &str) -> bool {
        self.specs
            .iter()
            .any(|s| s.formula.inputs().iter().any(|k| k.as_str() == key))
    }

    /// Target keys in evaluation order.
    pub fn targets(&self) -> impl Iterator<Item = &ColumnKey> {
        self.specs.iter().map(|s| &s.target_key)
    }

    /// Recompute every target on `row` in place.
    pub fn evaluate_in_place(&self, row: &mut RowRecord) {
        for spec in &self.specs {
            let value = spec.formula.compute(row);
            let value = if value.is_finite() { value } else { 0.0 };
            row.set(spec.target_key.clone(), CellValue::Number(value));
        }
    }

    /// Pure form of [`Self::evaluate_in_place`].
    #[must_use]
    pub fn evaluate(&self, row: &RowRecord) -> RowRecord {
        let mut out = row.clone();
        self.evaluate_in_place(&mut out);
        out
    }
}

/// Free-function form of [`DerivedRegistry::evaluate`].
#[must_use]
pub fn evaluate(row: &RowRecord, registry: &DerivedRegistry) -> RowRecord {
    registry.evaluate(row)
}

/// Read a cell as a number, spreadsheet style.
///
/// Numbers pass through; text contributes its leading numeric prefix (`"12 pcs"` → 12,
/// `" 3.5e2kg"` → 350); everything else, including non-finite values, is `0`.
#[must_use]
pub fn parse_number(value: &CellValue) -> f64 {
    let n = match value {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => leading_number(s).unwrap_or(0.0),
        CellValue::Empty => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Longest prefix of `s` (after leading whitespace) that is a decimal number.
fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    s.get(..end)?.parse().ok()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn invoice_row(
        rate: impl Into<CellValue>,
        boxes: impl Into<CellValue>,
        qty: impl Into<CellValue>,
    ) -> RowRecord {
        let mut row = RowRecord::new();
        row.set("rate_in_usd".into(), rate.into());
        row.set("total_no_of_boxes".into(), boxes.into());
        row.set("total_qty".into(), qty.into());
        row
    }

    fn copy_of(key: &str) -> Formula {
        Formula::Product {
            factors: vec![key.into()],
        }
    }

    fn num(row: &RowRecord, key: &str) -> f64 {
        row.get(key).as_number().expect("derived value is numeric")
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_discount_below_cap() {
        let row = DerivedRegistry::invoice().evaluate(&invoice_row(10, 2, 5));
        assert_close(num(&row, "product_value_in_usd"), 100.0);
        assert_close(num(&row, "discount"), 15.0);
        assert_close(num(&row, "net_amount"), 85.0);
    }

    #[test]
    fn test_discount_capped() {
        let row = DerivedRegistry::invoice().evaluate(&invoice_row(100, 10, 10));
        assert_close(num(&row, "product_value_in_usd"), 10000.0);
        assert_close(num(&row, "discount"), 50.0);
        assert_close(num(&row, "net_amount"), 9950.0);
    }

    #[test]
    fn test_text_sources_are_parsed() {
        let row = DerivedRegistry::invoice().evaluate(&invoice_row("10", " 2 boxes", "5"));
        assert_close(num(&row, "product_value_in_usd"), 100.0);
    }

    #[test]
    fn test_malformed_and_missing_sources_are_zero() {
        let row = DerivedRegistry::invoice().evaluate(&invoice_row("n/a", CellValue::Empty, 5));
        assert_eq!(num(&row, "product_value_in_usd"), 0.0);
        assert_eq!(num(&row, "discount"), 0.0);
        assert_eq!(num(&row, "net_amount"), 0.0);

        let row = DerivedRegistry::invoice().evaluate(&RowRecord::new());
        assert_eq!(num(&row, "net_amount"), 0.0);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let registry = DerivedRegistry::invoice();
        for row in [
            invoice_row(10, 2, 5),
            invoice_row(3.7, "x", 1e200),
            invoice_row(-4, 0.25, "9"),
        ] {
            let once = registry.evaluate(&row);
            assert_eq!(registry.evaluate(&once), once);
        }
    }

    #[test]
    fn test_overflow_writes_zero() {
        let row = DerivedRegistry::invoice().evaluate(&invoice_row(1e200, 1e200, 1e200));
        assert_eq!(num(&row, "product_value_in_usd"), 0.0);
    }

    #[test]
    fn test_evaluate_keeps_row_id_and_other_cells() {
        let mut row = invoice_row(1, 1, 1);
        row.set("hs_code".into(), "8471".into());
        let out = evaluate(&row, &DerivedRegistry::invoice());
        assert_eq!(out.id, row.id);
        assert_eq!(out.get("hs_code"), &CellValue::Text("8471".into()));
    }

    #[test]
    fn test_sources_and_targets() {
        let registry = DerivedRegistry::invoice();
        assert!(registry.is_source("rate_in_usd"));
        assert!(registry.is_source("total_qty"));
        assert!(!registry.is_source("hs_code"));
        assert!(registry.is_target("discount"));
        assert!(!registry.is_target("total_qty"));
        assert_eq!(
            registry.targets().map(ColumnKey::as_str).collect::<Vec<_>>(),
            vec!["product_value_in_usd", "discount", "net_amount"]
        );
    }

    #[test]
    fn test_rejects_forward_reference() {
        let specs = vec![
            DerivedFieldSpec::new(
                "b",
                Formula::Difference {
                    minuend: "a".into(),
                    subtrahend: "c".into(),
                },
            ),
            DerivedFieldSpec::new("c", copy_of("x")),
        ];
        assert!(matches!(
            DerivedRegistry::new(specs),
            Err(GridError::InvalidRegistry(_))
        ));
    }

    #[test]
    fn test_rejects_self_reference_and_duplicates() {
        let self_ref = vec![DerivedFieldSpec::new("a", copy_of("a"))];
        assert!(DerivedRegistry::new(self_ref).is_err());

        let dup = vec![
            DerivedFieldSpec::new("a", copy_of("x")),
            DerivedFieldSpec::new("a", copy_of("y")),
        ];
        assert!(DerivedRegistry::new(dup).is_err());
    }

    #[test]
    fn test_registry_from_json() {
        let json = r#"[
            {"targetKey": "total", "formula": {"op": "product", "factors": ["qty", "price"]}},
            {"targetKey": "fee", "formula": {"op": "capped_share", "of": "total", "rate": 0.1, "cap": 5}}
        ]"#;
        let registry: DerivedRegistry = serde_json::from_str(json).unwrap();
        assert_eq!(registry.specs().len(), 2);
        assert!(registry.is_source("price"));

        let bad = r#"[{"targetKey": "x", "formula": {"op": "product", "factors": ["x"]}}]"#;
        assert!(serde_json::from_str::<DerivedRegistry>(bad).is_err());
    }

    #[test]
    fn test_default_registry_round_trips_through_json() {
        let json = serde_json::to_string(&DerivedRegistry::default()).unwrap();
        let back: DerivedRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DerivedRegistry::invoice());
    }

    #[test_case("12", 12.0)]
    #[test_case("  -3.5", -3.5)]
    #[test_case("12 pcs", 12.0)]
    #[test_case(".5", 0.5)]
    #[test_case("5.", 5.0)]
    #[test_case("1e3", 1000.0)]
    #[test_case("2e", 2.0; "dangling exponent")]
    #[test_case("1,234", 1.0; "stops at separator")]
    #[test_case("abc", 0.0)]
    #[test_case("-", 0.0)]
    #[test_case(".", 0.0)]
    #[test_case("", 0.0)]
    #[test_case("Infinity", 0.0)]
    #[test_case("1e400", 0.0; "overflow")]
    fn test_parse_number_text(input: &str, expected: f64) {
        assert_eq!(parse_number(&CellValue::Text(input.into())), expected);
    }

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number(&CellValue::Number(2.5)), 2.5);
        assert_eq!(parse_number(&CellValue::Empty), 0.0);
    }
}
