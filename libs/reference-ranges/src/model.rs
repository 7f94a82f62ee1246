//! Canonical reference-range types shared by every stage of the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::age::AgeInterval;

pub type ParameterId = i64;
pub type RangeId = i64;

/// Notes marker carried by engine-generated gap placeholders.
pub const AUTO_FILL_NOTE: &str = "Auto-fill gap";

/// Notes marker carried by the single synthetic row of a parameter without real data.
pub const NO_REFERENCE_NOTE: &str = "No reference established";

/// Canonical sex segment of a range group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sex {
    Ambos,
    Masculino,
    Femenino,
}

impl Sex {
    pub const ALL: [Sex; 3] = [Sex::Ambos, Sex::Masculino, Sex::Femenino];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Ambos => "Ambos",
            Sex::Masculino => "Masculino",
            Sex::Femenino => "Femenino",
        }
    }

    /// Case-insensitive match against the accepted tokens, including the
    /// legacy single-letter and English spellings.
    pub fn parse_token(raw: &str) -> Option<Sex> {
        match raw.trim().to_lowercase().as_str() {
            "ambos" => Some(Sex::Ambos),
            "masculino" | "m" | "male" => Some(Sex::Masculino),
            "femenino" | "f" | "female" => Some(Sex::Femenino),
            _ => None,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AgeUnit {
    Days,
    Weeks,
    Months,
    #[default]
    Years,
}

impl AgeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeUnit::Days => "days",
            AgeUnit::Weeks => "weeks",
            AgeUnit::Months => "months",
            AgeUnit::Years => "years",
        }
    }

    pub fn parse_token(raw: &str) -> Option<AgeUnit> {
        match raw.trim().to_lowercase().as_str() {
            "days" | "day" | "d" | "dias" | "días" | "dia" | "día" => Some(AgeUnit::Days),
            "weeks" | "week" | "wk" | "w" | "semanas" | "semana" => Some(AgeUnit::Weeks),
            "months" | "month" | "mo" | "meses" | "mes" => Some(AgeUnit::Months),
            "years" | "year" | "yr" | "yrs" | "y" | "años" | "anos" | "año" | "ano" => {
                Some(AgeUnit::Years)
            }
            _ => None,
        }
    }

    fn per_year(&self) -> Decimal {
        match self {
            AgeUnit::Days => Decimal::from(365),
            AgeUnit::Weeks => Decimal::from(52),
            AgeUnit::Months => Decimal::from(12),
            AgeUnit::Years => Decimal::ONE,
        }
    }

    pub fn to_years(&self, value: Decimal) -> Decimal {
        match self {
            AgeUnit::Years => value,
            _ => value / self.per_year(),
        }
    }

    pub fn from_years(&self, years: Decimal) -> Decimal {
        years * self.per_year()
    }
}

impl fmt::Display for AgeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Numeric,
    Alphanumeric,
    FreeText,
    Empty,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Numeric => "numeric",
            ValueKind::Alphanumeric => "alphanumeric",
            ValueKind::FreeText => "free_text",
            ValueKind::Empty => "empty",
        }
    }

    pub fn parse(raw: &str) -> Option<ValueKind> {
        match raw {
            "numeric" => Some(ValueKind::Numeric),
            "alphanumeric" => Some(ValueKind::Alphanumeric),
            "free_text" => Some(ValueKind::FreeText),
            "empty" => Some(ValueKind::Empty),
            _ => None,
        }
    }
}

/// Value payload of a range: exactly one of the supported kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "valueKind", rename_all = "snake_case")]
pub enum RangeValue {
    Numeric {
        lower: Option<Decimal>,
        upper: Option<Decimal>,
    },
    Alphanumeric {
        #[serde(rename = "textValue")]
        text: String,
    },
    FreeText {
        #[serde(rename = "freeText")]
        text: String,
    },
    Empty,
}

impl RangeValue {
    /// Rebuild a value from its stored columns. Columns that contradict the
    /// declared kind degrade to `Empty` rather than failing the read.
    pub fn from_columns(
        kind: ValueKind,
        lower: Option<Decimal>,
        upper: Option<Decimal>,
        text: Option<String>,
    ) -> RangeValue {
        let text = clean_text(text.as_deref());
        match (kind, text) {
            (ValueKind::Numeric, _) if lower.is_some() || upper.is_some() => {
                RangeValue::Numeric { lower, upper }
            }
            (ValueKind::Alphanumeric, Some(text)) => RangeValue::Alphanumeric { text },
            (ValueKind::FreeText, Some(text)) => RangeValue::FreeText { text },
            _ => RangeValue::Empty,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            RangeValue::Numeric { .. } => ValueKind::Numeric,
            RangeValue::Alphanumeric { .. } => ValueKind::Alphanumeric,
            RangeValue::FreeText { .. } => ValueKind::FreeText,
            RangeValue::Empty => ValueKind::Empty,
        }
    }

    pub fn lower(&self) -> Option<Decimal> {
        match self {
            RangeValue::Numeric { lower, .. } => *lower,
            _ => None,
        }
    }

    pub fn upper(&self) -> Option<Decimal> {
        match self {
            RangeValue::Numeric { upper, .. } => *upper,
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            RangeValue::Alphanumeric { text } | RangeValue::FreeText { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RangeValue::Empty)
    }
}

/// How the engine treats a row when planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// Carries a clinical value.
    Real,
    /// Engine-generated gap marker.
    Placeholder,
    /// Synthetic "no reference established" row.
    Fallback,
    /// Valueless row without an engine marker (legacy or discarded client entry).
    Empty,
}

/// Everything about a range except its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeContent {
    pub sex: Sex,
    pub age_min: Option<Decimal>,
    pub age_max: Option<Decimal>,
    pub age_unit: AgeUnit,
    #[serde(flatten)]
    pub value: RangeValue,
    pub notes: Option<String>,
    pub unit: Option<String>,
    pub method: Option<String>,
}

impl RangeContent {
    pub fn placeholder(sex: Sex, span: AgeInterval) -> Self {
        Self {
            sex,
            age_min: span.min,
            age_max: span.max,
            age_unit: span.unit,
            value: RangeValue::Empty,
            notes: Some(AUTO_FILL_NOTE.to_string()),
            unit: None,
            method: None,
        }
    }

    pub fn fallback(sex: Sex) -> Self {
        Self {
            sex,
            age_min: None,
            age_max: None,
            age_unit: AgeUnit::Years,
            value: RangeValue::Empty,
            notes: Some(NO_REFERENCE_NOTE.to_string()),
            unit: None,
            method: None,
        }
    }

    pub fn kind(&self) -> RowKind {
        if !self.value.is_empty() {
            return RowKind::Real;
        }
        match self.notes.as_deref() {
            Some(AUTO_FILL_NOTE) => RowKind::Placeholder,
            Some(NO_REFERENCE_NOTE) => RowKind::Fallback,
            _ => RowKind::Empty,
        }
    }

    pub fn is_real(&self) -> bool {
        self.kind() == RowKind::Real
    }

    pub fn is_whole_life(&self) -> bool {
        self.age_min.is_none() && self.age_max.is_none()
    }

    pub fn interval(&self) -> AgeInterval {
        AgeInterval::new(self.age_min, self.age_max, self.age_unit)
    }

    /// Identity of a stored row for duplicate detection: every column of the
    /// uniqueness contract, with decimals and text normalized.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            sex: self.sex,
            age_min: self.age_min.map(|v| v.normalize()),
            age_max: self.age_max.map(|v| v.normalize()),
            age_unit: self.age_unit,
            value_kind: self.value.kind(),
            lower: self.value.lower().map(|v| v.normalize()),
            upper: self.value.upper().map(|v| v.normalize()),
            text_value: self.value.text().map(str::to_string),
            unit: clean_text(self.unit.as_deref()),
            method: clean_text(self.method.as_deref()),
        }
    }

    /// Key used to pair an incoming descriptor with an existing row when no id is given.
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            sex: self.sex,
            age_min: self.age_min.map(|v| v.normalize()),
            age_max: self.age_max.map(|v| v.normalize()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub sex: Sex,
    pub age_min: Option<Decimal>,
    pub age_max: Option<Decimal>,
    pub age_unit: AgeUnit,
    pub value_kind: ValueKind,
    pub lower: Option<Decimal>,
    pub upper: Option<Decimal>,
    pub text_value: Option<String>,
    pub unit: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub sex: Sex,
    pub age_min: Option<Decimal>,
    pub age_max: Option<Decimal>,
}

/// A persisted range row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRange {
    pub id: RangeId,
    pub parameter_id: ParameterId,
    #[serde(flatten)]
    pub content: RangeContent,
}

impl StoredRange {
    pub fn kind(&self) -> RowKind {
        self.content.kind()
    }
}

pub(crate) fn clean_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_sex_tokens_case_insensitively() {
        assert_eq!(Sex::parse_token("AMBOS"), Some(Sex::Ambos));
        assert_eq!(Sex::parse_token(" m "), Some(Sex::Masculino));
        assert_eq!(Sex::parse_token("Male"), Some(Sex::Masculino));
        assert_eq!(Sex::parse_token("f"), Some(Sex::Femenino));
        assert_eq!(Sex::parse_token("FEMALE"), Some(Sex::Femenino));
        assert_eq!(Sex::parse_token("x"), None);
        assert_eq!(Sex::parse_token(""), None);
    }

    #[test]
    fn converts_age_units_to_years() {
        assert_eq!(AgeUnit::Months.to_years(dec("18")), dec("1.5"));
        assert_eq!(AgeUnit::Years.to_years(dec("7")), dec("7"));
        assert_eq!(AgeUnit::Days.from_years(dec("120")), dec("43800"));
        assert_eq!(AgeUnit::parse_token("Años"), Some(AgeUnit::Years));
        assert_eq!(AgeUnit::parse_token("meses"), Some(AgeUnit::Months));
        assert_eq!(AgeUnit::parse_token("fortnights"), None);
    }

    #[test]
    fn classifies_rows_by_value_and_marker() {
        let placeholder = RangeContent::placeholder(
            Sex::Ambos,
            AgeInterval::new(Some(dec("18")), Some(dec("120")), AgeUnit::Years),
        );
        assert_eq!(placeholder.kind(), RowKind::Placeholder);
        assert_eq!(RangeContent::fallback(Sex::Ambos).kind(), RowKind::Fallback);

        let mut real = RangeContent::fallback(Sex::Masculino);
        real.value = RangeValue::Numeric {
            lower: Some(dec("1")),
            upper: None,
        };
        assert_eq!(real.kind(), RowKind::Real);

        real.value = RangeValue::Empty;
        real.notes = Some("left blank".into());
        assert_eq!(real.kind(), RowKind::Empty);
    }

    #[test]
    fn dedup_key_ignores_decimal_scale_and_whitespace() {
        let mut a = RangeContent::fallback(Sex::Femenino);
        a.age_min = Some(dec("1.0"));
        a.age_max = Some(dec("5"));
        a.value = RangeValue::Numeric {
            lower: Some(dec("3.50")),
            upper: Some(dec("7")),
        };
        a.method = Some(" ELISA ".into());

        let mut b = a.clone();
        b.age_min = Some(dec("1"));
        b.value = RangeValue::Numeric {
            lower: Some(dec("3.5")),
            upper: Some(dec("7.000")),
        };
        b.method = Some("ELISA".into());
        b.notes = Some("different notes".into());

        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.slot_key(), b.slot_key());
    }

    #[test]
    fn contradictory_columns_degrade_to_empty() {
        assert_eq!(
            RangeValue::from_columns(ValueKind::Numeric, None, None, None),
            RangeValue::Empty
        );
        assert_eq!(
            RangeValue::from_columns(ValueKind::Alphanumeric, None, None, Some("  ".into())),
            RangeValue::Empty
        );
        assert_eq!(
            RangeValue::from_columns(ValueKind::FreeText, None, None, Some(" Negativo ".into())),
            RangeValue::FreeText {
                text: "Negativo".into()
            }
        );
    }
}
