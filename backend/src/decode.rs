use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::features::{FeatureKind, FeatureSchema, FeatureSpec};
use crate::listing::{FieldValue, ListingRecord};

/// Submitted form data: every key with all of its values, in submission order.
pub type RawForm = BTreeMap<String, Vec<String>>;

/// How text from a boolean form field becomes a `bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanPolicy {
    /// Only `true`/`false`/`t`/`f` (any case) are accepted.
    #[default]
    Literal,
    /// Any non-empty text is `true`, so `"false"` decodes as `true`.
    /// Matches listings collected by the first version of the site.
    Legacy,
}

impl BooleanPolicy {
    pub fn coerce(self, raw: &str) -> Option<bool> {
        match self {
            BooleanPolicy::Legacy => Some(!raw.is_empty()),
            BooleanPolicy::Literal => parse_flag(raw),
        }
    }
}

/// Recognized boolean literals, case-insensitive.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" => Some(true),
        "false" | "f" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field}: not a listing attribute")]
    UnknownField { field: String },
    #[error("{field}: {label} is required")]
    MissingField { field: String, label: String },
    #[error("{field}: {label} must be a number, got {value:?}")]
    NotANumber {
        field: String,
        label: String,
        value: String,
    },
    #[error("{field}: {label} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        label: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field}: {value:?} is not a valid {label}")]
    NotAnOption {
        field: String,
        label: String,
        value: String,
    },
    #[error("{field}: {label} must be true or false, got {value:?}")]
    NotABoolean {
        field: String,
        label: String,
        value: String,
    },
}

impl ValidationError {
    /// Name of the offending form field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::UnknownField { field }
            | ValidationError::MissingField { field, .. }
            | ValidationError::NotANumber { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::NotAnOption { field, .. }
            | ValidationError::NotABoolean { field, .. } => field,
        }
    }
}

/// Collects `(key, value)` pairs from a urlencoded body into a `RawForm`.
pub fn group_pairs(pairs: Vec<(String, String)>) -> RawForm {
    let mut raw = RawForm::new();
    for (key, value) in pairs {
        raw.entry(key).or_default().push(value);
    }
    raw
}

/// First submitted value of every key, for echoing a rejected form back.
pub fn first_values(raw: &RawForm) -> BTreeMap<String, String> {
    raw.iter()
        .filter_map(|(k, v)| v.first().map(|first| (k.clone(), first.clone())))
        .collect()
}

/// Coerces a raw submission into a typed listing.
///
/// Every key must belong to the schema and every schema feature must be
/// present. Only the first value of a repeated key is considered.
pub fn decode(
    raw: &RawForm,
    schema: &FeatureSchema,
    policy: BooleanPolicy,
) -> Result<ListingRecord, ValidationError> {
    if let Some(unknown) = raw.keys().find(|k| !schema.contains(k)) {
        return Err(ValidationError::UnknownField {
            field: unknown.clone(),
        });
    }

    let mut record = ListingRecord::new();
    for spec in schema.iter() {
        let value = raw
            .get(&spec.name)
            .and_then(|values| values.first())
            .ok_or_else(|| ValidationError::MissingField {
                field: spec.name.clone(),
                label: spec.label.clone(),
            })?;
        record.insert(spec.name.clone(), decode_field(spec, value.trim(), policy)?);
    }
    Ok(record)
}

fn decode_field(
    spec: &FeatureSpec,
    value: &str,
    policy: BooleanPolicy,
) -> Result<FieldValue, ValidationError> {
    match &spec.kind {
        FeatureKind::Choice { options } => {
            if options.iter().any(|o| o == value) {
                Ok(FieldValue::Text(value.to_string()))
            } else {
                Err(ValidationError::NotAnOption {
                    field: spec.name.clone(),
                    label: spec.label.clone(),
                    value: value.to_string(),
                })
            }
        }
        FeatureKind::Number { min, max, .. } => {
            let number = value
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| ValidationError::NotANumber {
                    field: spec.name.clone(),
                    label: spec.label.clone(),
                    value: value.to_string(),
                })?;
            if number < *min || number > *max {
                return Err(ValidationError::OutOfRange {
                    field: spec.name.clone(),
                    label: spec.label.clone(),
                    value: number,
                    min: *min,
                    max: *max,
                });
            }
            Ok(FieldValue::Number(number))
        }
        FeatureKind::Boolean => policy
            .coerce(value)
            .map(FieldValue::Flag)
            .ok_or_else(|| ValidationError::NotABoolean {
                field: spec.name.clone(),
                label: spec.label.clone(),
                value: value.to_string(),
            }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::features::load_schema;

    pub(crate) fn valid_pairs() -> Vec<(String, String)> {
        [
            ("city", "NYC"),
            ("property_type", "Apartment"),
            ("room_type", "Entire home/apt"),
            ("accommodates", "16"),
            ("bedrooms", "10"),
            ("beds", "18"),
            ("bathrooms", "8"),
            ("bed_type", "Real Bed"),
            ("cancellation_policy", "strict"),
            ("cleaning_fee", "true"),
            ("instant_bookable", "t"),
            ("number_of_reviews", "605"),
            ("review_scores_rating", "100"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    pub(crate) fn valid_form() -> RawForm {
        group_pairs(valid_pairs())
    }

    fn with(field: &str, value: &str) -> RawForm {
        let mut raw = valid_form();
        raw.insert(field.to_string(), vec![value.to_string()]);
        raw
    }

    #[test]
    fn decodes_the_reference_listing() {
        let schema = load_schema().unwrap();
        let record = decode(&valid_form(), &schema, BooleanPolicy::Literal).unwrap();
        assert_eq!(record.len(), schema.len());
        assert_eq!(record.get("accommodates"), Some(&FieldValue::Number(16.0)));
        assert_eq!(
            record.get("property_type"),
            Some(&FieldValue::Text("Apartment".into()))
        );
        assert_eq!(record.get("instant_bookable"), Some(&FieldValue::Flag(true)));
    }

    #[test]
    fn number_bounds_are_inclusive() {
        let schema = load_schema().unwrap();
        for spec in schema.iter() {
            let FeatureKind::Number { min, max, step } = spec.kind else {
                continue;
            };
            for edge in [min, max] {
                let record = decode(
                    &with(&spec.name, &edge.to_string()),
                    &schema,
                    BooleanPolicy::Literal,
                )
                .unwrap();
                assert_eq!(record.get(&spec.name), Some(&FieldValue::Number(edge)));
            }
            for outside in [min - step, max + step] {
                let err = decode(
                    &with(&spec.name, &outside.to_string()),
                    &schema,
                    BooleanPolicy::Literal,
                )
                .unwrap_err();
                assert!(
                    matches!(err, ValidationError::OutOfRange { .. }),
                    "{} accepted {}",
                    spec.name,
                    outside
                );
                assert_eq!(err.field(), spec.name);
            }
        }
    }

    #[test]
    fn accommodates_above_max_names_the_field() {
        let schema = load_schema().unwrap();
        let err = decode(&with("accommodates", "17"), &schema, BooleanPolicy::Literal).unwrap_err();
        assert_eq!(err.field(), "accommodates");
        assert!(err.to_string().starts_with("accommodates:"));
    }

    #[test]
    fn every_listed_option_round_trips() {
        let schema = load_schema().unwrap();
        for spec in schema.iter() {
            let Some(options) = spec.options() else {
                continue;
            };
            for option in options {
                let record =
                    decode(&with(&spec.name, option), &schema, BooleanPolicy::Literal).unwrap();
                assert_eq!(
                    record.get(&spec.name),
                    Some(&FieldValue::Text(option.clone()))
                );
            }
            let err = decode(&with(&spec.name, "Castle"), &schema, BooleanPolicy::Literal)
                .unwrap_err();
            assert!(matches!(err, ValidationError::NotAnOption { .. }));
        }
    }

    #[test]
    fn choice_matching_is_exact() {
        let schema = load_schema().unwrap();
        let err = decode(&with("city", "nyc"), &schema, BooleanPolicy::Literal).unwrap_err();
        assert_eq!(err.field(), "city");
    }

    #[test]
    fn rejects_unknown_fields() {
        let schema = load_schema().unwrap();
        let err = decode(&with("pool", "yes"), &schema, BooleanPolicy::Literal).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownField {
                field: "pool".into()
            }
        );
    }

    #[test]
    fn rejects_missing_and_empty_fields() {
        let schema = load_schema().unwrap();
        let mut raw = valid_form();
        raw.remove("beds");
        let err = decode(&raw, &schema, BooleanPolicy::Literal).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field, .. } if field == "beds"));

        let mut raw = valid_form();
        raw.insert("beds".into(), Vec::new());
        let err = decode(&raw, &schema, BooleanPolicy::Literal).unwrap_err();
        assert_eq!(err.field(), "beds");
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let schema = load_schema().unwrap();
        for bad in ["", "two", "NaN", "inf"] {
            let err = decode(&with("beds", bad), &schema, BooleanPolicy::Literal).unwrap_err();
            assert!(matches!(err, ValidationError::NotANumber { .. }), "{}", bad);
        }
    }

    #[test]
    fn first_value_wins() {
        let schema = load_schema().unwrap();
        let mut raw = valid_form();
        raw.insert("beds".into(), vec!["3".into(), "99".into()]);
        let record = decode(&raw, &schema, BooleanPolicy::Literal).unwrap();
        assert_eq!(record.get("beds"), Some(&FieldValue::Number(3.0)));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let schema = load_schema().unwrap();
        let record = decode(&with("bathrooms", " 1.5 "), &schema, BooleanPolicy::Literal).unwrap();
        assert_eq!(record.get("bathrooms"), Some(&FieldValue::Number(1.5)));
    }

    #[test]
    fn decoding_is_idempotent() {
        let schema = load_schema().unwrap();
        let raw = valid_form();
        let first = decode(&raw, &schema, BooleanPolicy::Literal).unwrap();
        let second = decode(&raw, &schema, BooleanPolicy::Literal).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn submission_order_does_not_matter() {
        let schema = load_schema().unwrap();
        let mut reversed = valid_pairs();
        reversed.reverse();
        assert_eq!(
            decode(&group_pairs(reversed), &schema, BooleanPolicy::Literal).unwrap(),
            decode(&valid_form(), &schema, BooleanPolicy::Literal).unwrap()
        );
    }

    #[test]
    fn literal_policy_reads_false_as_false() {
        let schema = load_schema().unwrap();
        let record = decode(&with("cleaning_fee", "false"), &schema, BooleanPolicy::Literal).unwrap();
        assert_eq!(record.get("cleaning_fee"), Some(&FieldValue::Flag(false)));

        let record = decode(&with("cleaning_fee", "F"), &schema, BooleanPolicy::Literal).unwrap();
        assert_eq!(record.get("cleaning_fee"), Some(&FieldValue::Flag(false)));

        let err = decode(&with("cleaning_fee", "yes"), &schema, BooleanPolicy::Literal).unwrap_err();
        assert!(matches!(err, ValidationError::NotABoolean { .. }));
    }

    #[test]
    fn legacy_policy_reads_false_as_true() {
        let schema = load_schema().unwrap();
        let record = decode(&with("cleaning_fee", "false"), &schema, BooleanPolicy::Legacy).unwrap();
        assert_eq!(record.get("cleaning_fee"), Some(&FieldValue::Flag(true)));

        let record = decode(&with("cleaning_fee", ""), &schema, BooleanPolicy::Legacy).unwrap();
        assert_eq!(record.get("cleaning_fee"), Some(&FieldValue::Flag(false)));
    }

    #[test]
    fn first_values_echo_the_submission() {
        let mut raw = valid_form();
        raw.insert("beds".into(), vec!["3".into(), "4".into()]);
        raw.insert("empty".into(), Vec::new());
        let echoed = first_values(&raw);
        assert_eq!(echoed["beds"], "3");
        assert!(!echoed.contains_key("empty"));
    }
}
