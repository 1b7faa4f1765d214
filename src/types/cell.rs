use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A single cell value.
///
/// Spreadsheet cells arrive as strings, numbers or nothing at all. Every row keeps an
/// explicit [`CellValue::Empty`] for columns it has no value for.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "CellRepr")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
}

/// Wire shape accepted from JavaScript / JSON.
#[derive(Deserialize)]
#[serde(untagged)]
enum CellRepr {
    Number(f64),
    Bool(bool),
    Text(String),
    Null(()),
}

impl From<CellRepr> for CellValue {
    fn from(repr: CellRepr) -> Self {
        match repr {
            CellRepr::Number(n) => Self::number(n),
            CellRepr::Bool(b) => Self::Text(if b { "TRUE" } else { "FALSE" }.to_string()),
            CellRepr::Text(s) if s.is_empty() => Self::Empty,
            CellRepr::Text(s) => Self::Text(s),
            CellRepr::Null(()) => Self::Empty,
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Number(n) => serializer.serialize_f64(*n),
        }
    }
}

impl CellValue {
    /// Numeric cell. Non-finite values have no spreadsheet representation and become empty.
    #[must_use]
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            Self::Number(n)
        } else {
            Self::Empty
        }
    }

    /// Canonical form: empty text and non-finite numbers become `Empty`.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Text(s) if s.is_empty() => Self::Empty,
            Self::Number(n) => Self::number(n),
            other => other,
        }
    }

    /// Interpret user input the way a grid editor does:
    /// - blank → `Empty`
    /// - canonical number text (`"12"`, `"0.5"`, `"-3"`) → `Number`
    /// - anything else → `Text`, untrimmed
    ///
    /// Only text that prints back identically becomes a number, so codes like
    /// `"007"` or `"1.50"` keep their spelling.
    #[must_use]
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() && n.to_string() == trimmed => Self::Number(n),
            _ => Self::Text(input.to_string()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Display text, as shown in a cell and used to seed the edit buffer.
    #[must_use]
    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s)
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::number(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

/// A raw rectangular matrix of cells, as produced by a decoder. Rows may be ragged.
pub type CellMatrix = Vec<Vec<CellValue>>;

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

    #[test_case("", CellValue::Empty; "blank")]
    #[test_case("   ", CellValue::Empty; "whitespace")]
    #[test_case("12", CellValue::Number(12.0); "integer")]
    #[test_case("-0.5", CellValue::Number(-0.5); "negative decimal")]
    #[test_case(" 42 ", CellValue::Number(42.0); "padded")]
    #[test_case("007", CellValue::Text("007".into()); "leading zeros stay text")]
    #[test_case("1.50", CellValue::Text("1.50".into()); "trailing zero stays text")]
    #[test_case("NaN", CellValue::Text("NaN".into()); "nan stays text")]
    #[test_case("abc", CellValue::Text("abc".into()); "plain text")]
    fn test_from_input(input: &str, expected: CellValue) {
        assert_eq!(CellValue::from_input(input), expected);
    }

    #[test]
    fn test_display_round_trips_through_input() {
        for v in [
            CellValue::Number(100.0),
            CellValue::Number(0.1),
            CellValue::Number(-9950.25),
            CellValue::Text("HS-001".into()),
            CellValue::Empty,
        ] {
            assert_eq!(CellValue::from_input(&v.display()), v);
        }
    }

    #[test]
    fn test_non_finite_number_is_empty() {
        assert_eq!(CellValue::number(f64::NAN), CellValue::Empty);
        assert_eq!(CellValue::number(f64::INFINITY), CellValue::Empty);
    }

    #[test]
    fn test_serde_shapes() {
        let json = serde_json::to_string(&vec![
            CellValue::Empty,
            CellValue::Text("a".into()),
            CellValue::Number(2.5),
        ])
        .unwrap();
        assert_eq!(json, r#"["","a",2.5]"#);

        let parsed: Vec<CellValue> = serde_json::from_str(r#"["", null, "x", 3, true]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                CellValue::Empty,
                CellValue::Empty,
                CellValue::Text("x".into()),
                CellValue::Number(3.0),
                CellValue::Text("TRUE".into()),
            ]
        );
    }
}
