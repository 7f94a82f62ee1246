//! Client descriptor → canonical range content.
//!
//! Normalization is a pure transform. Anything the normalizer had to guess
//! (an unknown sex token, a missing age unit) is recorded in a
//! [`NormalizationReport`] instead of being applied silently, so callers can
//! log or surface the coercion.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

use crate::age::MAX_AGE_BOUND_YEARS;
use crate::error::{RangeError, Result};
use crate::model::{clean_text, AgeUnit, RangeContent, RangeId, RangeValue, Sex, AUTO_FILL_NOTE};

/// One range entry as submitted by a client.
///
/// Numeric fields are kept as raw JSON so that numbers, numeric strings and
/// blank form fields can all be accepted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeDescriptor {
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default, alias = "sexo")]
    pub sex: Option<String>,
    #[serde(default, alias = "age_min", alias = "edadMin")]
    pub age_min: Option<JsonValue>,
    #[serde(default, alias = "age_max", alias = "edadMax")]
    pub age_max: Option<JsonValue>,
    #[serde(default, alias = "age_unit", alias = "unidadEdad")]
    pub age_unit: Option<String>,
    #[serde(default, alias = "valorMin")]
    pub lower: Option<JsonValue>,
    #[serde(default, alias = "valorMax")]
    pub upper: Option<JsonValue>,
    #[serde(default, alias = "text_value", alias = "valorTexto")]
    pub text_value: Option<String>,
    #[serde(default, alias = "free_text", alias = "textoLibre")]
    pub free_text: Option<String>,
    #[serde(default, alias = "notas")]
    pub notes: Option<String>,
    #[serde(default, alias = "unidad")]
    pub unit: Option<String>,
    #[serde(default, alias = "metodo")]
    pub method: Option<String>,
}

/// What to do with sex tokens that match none of the accepted spellings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SexPolicy {
    /// Coerce to `Ambos` and record the coercion.
    #[default]
    Lenient,
    /// Reject with `INVALID_SEX`.
    Strict,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    pub sex_policy: SexPolicy,
}

/// How a normalized descriptor participates in planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorRole {
    /// Carries a value; validated and persisted.
    Real,
    /// No value at all; only signals a possible synthetic fallback.
    PlaceholderCandidate,
    /// A previously fetched engine placeholder sent back unchanged; ignored.
    PlaceholderEcho,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDescriptor {
    pub index: usize,
    pub id: Option<RangeId>,
    pub role: DescriptorRole,
    pub content: RangeContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationNote {
    SexCoerced { index: usize, raw: String },
    SexDefaulted { index: usize },
    AgeUnitDefaulted { index: usize },
    PlaceholderEchoIgnored { index: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationReport {
    pub notes: Vec<NormalizationNote>,
}

impl NormalizationReport {
    pub fn push(&mut self, note: NormalizationNote) {
        self.notes.push(note);
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn sex_coercions(&self) -> impl Iterator<Item = (usize, &str)> {
        self.notes.iter().filter_map(|note| match note {
            NormalizationNote::SexCoerced { index, raw } => Some((*index, raw.as_str())),
            _ => None,
        })
    }
}

pub fn normalize_all(
    descriptors: &[RangeDescriptor],
    options: &NormalizeOptions,
    report: &mut NormalizationReport,
) -> Result<Vec<NormalizedDescriptor>> {
    descriptors
        .iter()
        .enumerate()
        .map(|(index, descriptor)| normalize_descriptor(index, descriptor, options, report))
        .collect()
}

pub fn normalize_descriptor(
    index: usize,
    descriptor: &RangeDescriptor,
    options: &NormalizeOptions,
    report: &mut NormalizationReport,
) -> Result<NormalizedDescriptor> {
    let sex = normalize_sex(index, descriptor.sex.as_deref(), options, report)?;

    let age_unit = match clean_text(descriptor.age_unit.as_deref()) {
        None => {
            report.push(NormalizationNote::AgeUnitDefaulted { index });
            AgeUnit::Years
        }
        Some(raw) => {
            AgeUnit::parse_token(&raw).ok_or(RangeError::InvalidAgeUnit { index, raw })?
        }
    };

    let age_min = parse_decimal(index, "ageMin", descriptor.age_min.as_ref())?;
    let age_max = parse_decimal(index, "ageMax", descriptor.age_max.as_ref())?;
    check_age_bounds(index, age_min, age_max, age_unit)?;

    let lower = parse_decimal(index, "lower", descriptor.lower.as_ref())?;
    let upper = parse_decimal(index, "upper", descriptor.upper.as_ref())?;
    if let (Some(lower), Some(upper)) = (lower, upper) {
        if lower > upper {
            return Err(RangeError::InvalidValueRange {
                index,
                lower,
                upper,
            });
        }
    }

    let value = classify_value(
        lower,
        upper,
        clean_text(descriptor.text_value.as_deref()),
        clean_text(descriptor.free_text.as_deref()),
    );
    let notes = clean_text(descriptor.notes.as_deref());

    let role = match (&value, notes.as_deref()) {
        (RangeValue::Empty, Some(AUTO_FILL_NOTE)) => {
            report.push(NormalizationNote::PlaceholderEchoIgnored { index });
            DescriptorRole::PlaceholderEcho
        }
        (RangeValue::Empty, _) => DescriptorRole::PlaceholderCandidate,
        _ => DescriptorRole::Real,
    };

    Ok(NormalizedDescriptor {
        index,
        id: parse_id(descriptor.id.as_ref()),
        role,
        content: RangeContent {
            sex,
            age_min,
            age_max,
            age_unit,
            value,
            notes,
            unit: clean_text(descriptor.unit.as_deref()),
            method: clean_text(descriptor.method.as_deref()),
        },
    })
}

fn normalize_sex(
    index: usize,
    raw: Option<&str>,
    options: &NormalizeOptions,
    report: &mut NormalizationReport,
) -> Result<Sex> {
    let Some(raw) = clean_text(raw) else {
        report.push(NormalizationNote::SexDefaulted { index });
        return Ok(Sex::Ambos);
    };

    match Sex::parse_token(&raw) {
        Some(sex) => Ok(sex),
        None => match options.sex_policy {
            SexPolicy::Strict => Err(RangeError::InvalidSex { index, raw }),
            SexPolicy::Lenient => {
                report.push(NormalizationNote::SexCoerced { index, raw });
                Ok(Sex::Ambos)
            }
        },
    }
}

fn check_age_bounds(
    index: usize,
    age_min: Option<Decimal>,
    age_max: Option<Decimal>,
    age_unit: AgeUnit,
) -> Result<()> {
    let invalid = || RangeError::InvalidAgeRange {
        index,
        age_min: display_bound(age_min),
        age_max: display_bound(age_max),
    };

    let limit = Decimal::from(MAX_AGE_BOUND_YEARS);
    let out_of_range = |v: Decimal| v < Decimal::ZERO || age_unit.to_years(v) > limit;
    if age_min.is_some_and(out_of_range) || age_max.is_some_and(out_of_range) {
        return Err(invalid());
    }
    if let (Some(min), Some(max)) = (age_min, age_max) {
        if min >= max {
            return Err(invalid());
        }
    }
    Ok(())
}

fn classify_value(
    lower: Option<Decimal>,
    upper: Option<Decimal>,
    text_value: Option<String>,
    free_text: Option<String>,
) -> RangeValue {
    if lower.is_some() || upper.is_some() {
        RangeValue::Numeric { lower, upper }
    } else if let Some(text) = text_value {
        RangeValue::Alphanumeric { text }
    } else if let Some(text) = free_text {
        RangeValue::FreeText { text }
    } else {
        RangeValue::Empty
    }
}

/// Accepts JSON numbers, numeric strings (comma or dot decimal separator) and
/// treats `null`/blank strings as absent.
pub(crate) fn parse_decimal(
    index: usize,
    field: &'static str,
    raw: Option<&JsonValue>,
) -> Result<Option<Decimal>> {
    let invalid = |raw: String| RangeError::InvalidNumericValue { index, field, raw };

    let text = match raw {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed.replace(',', ".")
        }
        Some(other) => return Err(invalid(other.to_string())),
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(|v| Some(v.normalize()))
        .map_err(|_| invalid(text))
}

fn parse_id(raw: Option<&JsonValue>) -> Option<RangeId> {
    match raw? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn display_bound(bound: Option<Decimal>) -> String {
    bound
        .map(|v| v.normalize().to_string())
        .unwrap_or_else(|| "null".to_string())
}
