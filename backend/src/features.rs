use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Bumped whenever `CANONICAL_COLUMNS` changes. A model exported against an
/// older order must not be served with a newer schema.
pub const SCHEMA_VERSION: u32 = 2;

/// Column order the price model was fit on.
pub const CANONICAL_COLUMNS: [&str; 13] = [
    "property_type",
    "room_type",
    "accommodates",
    "bathrooms",
    "bed_type",
    "cancellation_policy",
    "cleaning_fee",
    "city",
    "instant_bookable",
    "number_of_reviews",
    "review_scores_rating",
    "bedrooms",
    "beds",
];

/// Columns the model was trained on as booleans.
pub const BOOLEAN_COLUMNS: [&str; 2] = ["cleaning_fee", "instant_bookable"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeatureKind {
    Choice { options: Vec<String> },
    Number { min: f64, max: f64, step: f64 },
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSpec {
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FeatureKind,
}

impl FeatureSpec {
    pub fn choice(name: &str, label: &str, options: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FeatureKind::Choice {
                options: options.iter().map(|o| o.to_string()).collect(),
            },
        }
    }

    pub fn number(name: &str, label: &str, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FeatureKind::Number { min, max, step },
        }
    }

    pub fn boolean(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FeatureKind::Boolean,
        }
    }

    /// Allowed options for a choice feature, `None` for every other kind.
    pub fn options(&self) -> Option<&[String]> {
        match &self.kind {
            FeatureKind::Choice { options } => Some(options),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("feature `{0}` is declared more than once")]
    Duplicate(String),
    #[error("canonical column `{0}` has no feature definition")]
    MissingColumn(String),
    #[error("canonical column `{0}` is listed more than once")]
    DuplicateColumn(String),
    #[error("feature `{0}` is not part of the canonical column order")]
    Unordered(String),
    #[error("feature `{name}` has an invalid domain: {reason}")]
    InvalidDomain { name: String, reason: String },
}

/// Every listing attribute the form collects and the model consumes.
///
/// Features iterate in display order; `canonical_order` is the separate,
/// fixed order the model expects.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSchema {
    version: u32,
    features: Vec<FeatureSpec>,
    columns: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl FeatureSchema {
    pub fn new(
        version: u32,
        features: Vec<FeatureSpec>,
        columns: &[&str],
    ) -> Result<Self, SchemaError> {
        let mut index = HashMap::with_capacity(features.len());
        for (position, spec) in features.iter().enumerate() {
            validate_domain(spec)?;
            if index.insert(spec.name.clone(), position).is_some() {
                return Err(SchemaError::Duplicate(spec.name.clone()));
            }
        }

        let mut ordered: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            if !index.contains_key(*column) {
                return Err(SchemaError::MissingColumn(column.to_string()));
            }
            if ordered.iter().any(|c| c == column) {
                return Err(SchemaError::DuplicateColumn(column.to_string()));
            }
            ordered.push(column.to_string());
        }
        if let Some(extra) = features.iter().find(|f| !ordered.contains(&f.name)) {
            return Err(SchemaError::Unordered(extra.name.clone()));
        }

        Ok(Self {
            version,
            features,
            columns: ordered,
            index,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.index.get(name).map(|&i| &self.features[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Features in form display order.
    pub fn iter(&self) -> impl Iterator<Item = &FeatureSpec> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn canonical_order(&self) -> &[String] {
        &self.columns
    }
}

fn validate_domain(spec: &FeatureSpec) -> Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidDomain {
        name: spec.name.clone(),
        reason: reason.to_string(),
    };
    match &spec.kind {
        FeatureKind::Choice { options } if options.is_empty() => Err(invalid("no options")),
        FeatureKind::Number { min, max, step } => {
            if !(min.is_finite() && max.is_finite()) || min > max {
                Err(invalid("min must not exceed max"))
            } else if *step <= 0.0 {
                Err(invalid("step must be positive"))
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

/// Listing attributes used by the price model, in the order the form shows them.
pub fn load_schema() -> Result<FeatureSchema, SchemaError> {
    let features = vec![
        FeatureSpec::choice("city", "City", &["NYC", "LA", "SF", "DC", "Chicago"]),
        FeatureSpec::choice(
            "property_type",
            "Property Type",
            &["Apartment", "House", "Condominium", "Townhouse", "Loft"],
        ),
        FeatureSpec::choice(
            "room_type",
            "Room Type",
            &["Entire home/apt", "Private room", "Shared room"],
        ),
        FeatureSpec::number("accommodates", "Accommodates", 0.0, 16.0, 1.0),
        FeatureSpec::number("bedrooms", "Bedrooms", 0.0, 10.0, 1.0),
        FeatureSpec::number("beds", "Beds", 0.0, 18.0, 1.0),
        FeatureSpec::number("bathrooms", "Bathrooms", 0.0, 8.0, 0.5),
        FeatureSpec::choice(
            "bed_type",
            "Bed Type",
            &["Real Bed", "Futon", "Pull-out Sofa", "Airbed", "Couch"],
        ),
        FeatureSpec::choice(
            "cancellation_policy",
            "Cancellation Policy",
            &[
                "strict",
                "flexible",
                "moderate",
                "super_strict_30",
                "super_strict_60",
            ],
        ),
        FeatureSpec::boolean("cleaning_fee", "Cleaning Fee?"),
        FeatureSpec::boolean("instant_bookable", "Instant Bookable?"),
        FeatureSpec::number("number_of_reviews", "Number of Reviews", 0.0, 605.0, 1.0),
        FeatureSpec::number(
            "review_scores_rating",
            "Review Scores Rating",
            20.0,
            100.0,
            1.0,
        ),
    ];
    FeatureSchema::new(SCHEMA_VERSION, features, &CANONICAL_COLUMNS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_canonical_column_has_one_spec() {
        let schema = load_schema().unwrap();
        assert_eq!(schema.len(), CANONICAL_COLUMNS.len());
        for column in CANONICAL_COLUMNS {
            assert!(schema.get(column).is_some(), "no spec for {}", column);
        }
        assert_eq!(schema.canonical_order(), CANONICAL_COLUMNS);
    }

    #[test]
    fn display_order_is_independent_of_column_order() {
        let schema = load_schema().unwrap();
        let first: Vec<&str> = schema.iter().take(2).map(|f| f.name.as_str()).collect();
        assert_eq!(first, ["city", "property_type"]);
        assert_eq!(schema.canonical_order()[0], "property_type");
    }

    #[test]
    fn boolean_columns_are_boolean_features() {
        let schema = load_schema().unwrap();
        for column in BOOLEAN_COLUMNS {
            assert_eq!(schema.get(column).unwrap().kind, FeatureKind::Boolean);
        }
    }

    #[test]
    fn loading_is_deterministic() {
        let a = load_schema().unwrap();
        let b = load_schema().unwrap();
        assert_eq!(a.version(), b.version());
        assert!(a.iter().eq(b.iter()));
    }

    #[test]
    fn rejects_duplicate_features() {
        let err = FeatureSchema::new(
            1,
            vec![
                FeatureSpec::boolean("a", "A"),
                FeatureSpec::boolean("a", "A again"),
            ],
            &["a"],
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::Duplicate("a".into()));
    }

    #[test]
    fn rejects_column_without_spec() {
        let err =
            FeatureSchema::new(1, vec![FeatureSpec::boolean("a", "A")], &["a", "b"]).unwrap_err();
        assert_eq!(err, SchemaError::MissingColumn("b".into()));
    }

    #[test]
    fn rejects_spec_outside_column_order() {
        let err = FeatureSchema::new(
            1,
            vec![FeatureSpec::boolean("a", "A"), FeatureSpec::boolean("b", "B")],
            &["a"],
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::Unordered("b".into()));
    }

    #[test]
    fn rejects_inverted_number_range() {
        let err = FeatureSchema::new(
            1,
            vec![FeatureSpec::number("n", "N", 5.0, 1.0, 1.0)],
            &["n"],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDomain { .. }));
    }

    #[test]
    fn rejects_empty_choice() {
        let err = FeatureSchema::new(1, vec![FeatureSpec::choice("c", "C", &[])], &["c"])
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDomain { .. }));
    }
}
