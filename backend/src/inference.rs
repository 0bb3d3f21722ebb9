use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tract_onnx::prelude::*;

use crate::decode::parse_flag;
use crate::features::{FeatureSchema, BOOLEAN_COLUMNS};
use crate::listing::{FieldValue, ListingRecord};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model input is missing `{column}`: {reason}")]
    MissingFeature { column: String, reason: String },
    #[error("price model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("price model failed: {0}")]
    Model(String),
}

/// One listing laid out in canonical column order, ready for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRow {
    columns: Vec<(String, FieldValue)>,
}

impl ModelRow {
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[cfg(test)]
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }
}

/// A trained regression model that prices a single listing.
pub trait PriceModel: Send + Sync {
    fn predict(&self, row: &ModelRow) -> Result<f64, InferenceError>;
}

/// Suggested nightly price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction(f64);

impl Prediction {
    pub fn formatted(self) -> String {
        format!("{:.2}", self.0)
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Lays the record out in the schema's canonical column order.
pub fn project(record: &ListingRecord, schema: &FeatureSchema) -> Result<ModelRow, InferenceError> {
    let columns = schema
        .canonical_order()
        .iter()
        .map(|column| {
            record
                .get(column)
                .map(|value| (column.clone(), value.clone()))
                .ok_or_else(|| InferenceError::MissingFeature {
                    column: column.clone(),
                    reason: "absent from listing".to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ModelRow { columns })
}

/// Casts the boolean-flag columns to `bool`. There is no untyped fallback:
/// a flag the model cannot read is reported instead of guessed.
pub fn cast_flags(row: &mut ModelRow) -> Result<(), InferenceError> {
    for column in BOOLEAN_COLUMNS {
        let Some((_, value)) = row.columns.iter_mut().find(|(name, _)| name == column) else {
            log::warn!("Boolean column {} is not in the model row", column);
            return Err(InferenceError::MissingFeature {
                column: column.to_string(),
                reason: "boolean column not in model row".to_string(),
            });
        };
        let flag = match value {
            FieldValue::Flag(b) => *b,
            FieldValue::Text(s) => match parse_flag(s) {
                Some(b) => b,
                None => {
                    log::warn!("Cannot cast {}={:?} to bool", column, s);
                    return Err(InferenceError::MissingFeature {
                        column: column.to_string(),
                        reason: format!("{:?} is not a boolean", s),
                    });
                }
            },
            FieldValue::Number(n) => {
                log::warn!("Cannot cast numeric {}={} to bool", column, n);
                return Err(InferenceError::MissingFeature {
                    column: column.to_string(),
                    reason: format!("{} is not a boolean", n),
                });
            }
        };
        *value = FieldValue::Flag(flag);
    }
    Ok(())
}

/// Projects, casts and prices one listing.
pub fn predict(
    record: &ListingRecord,
    schema: &FeatureSchema,
    model: &dyn PriceModel,
) -> Result<Prediction, InferenceError> {
    let mut row = project(record, schema)?;
    cast_flags(&mut row)?;
    let price = model.predict(&row)?;
    if !price.is_finite() {
        return Err(InferenceError::Model(format!("non-finite prediction {}", price)));
    }
    Ok(Prediction(price))
}

/// Fully populated listing used by the `/examples` smoke test.
pub fn example_listing() -> ListingRecord {
    ListingRecord::new()
        .with("property_type", FieldValue::Text("Apartment".into()))
        .with("room_type", FieldValue::Text("Entire home/apt".into()))
        .with("accommodates", FieldValue::Number(16.0))
        .with("bathrooms", FieldValue::Number(8.0))
        .with("bed_type", FieldValue::Text("Real Bed".into()))
        .with("cancellation_policy", FieldValue::Text("strict".into()))
        .with("cleaning_fee", FieldValue::Flag(true))
        .with("city", FieldValue::Text("NYC".into()))
        .with("instant_bookable", FieldValue::Flag(true))
        .with("number_of_reviews", FieldValue::Number(605.0))
        .with("review_scores_rating", FieldValue::Number(100.0))
        .with("bedrooms", FieldValue::Number(10.0))
        .with("beds", FieldValue::Number(18.0))
}

/// Regression model exported to ONNX, taking one `[1, columns]` f32 row.
pub struct OnnxPriceModel {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    columns: Vec<String>,
    ordinals: HashMap<String, Vec<String>>,
}

impl OnnxPriceModel {
    pub fn load<P: AsRef<Path>>(model_path: P, schema: &FeatureSchema) -> Result<Self, InferenceError> {
        let path = model_path.as_ref();
        if !path.is_file() {
            return Err(InferenceError::ModelUnavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let columns: Vec<String> = schema.canonical_order().to_vec();
        let width = columns.len();
        let unavailable = |e: TractError| {
            InferenceError::ModelUnavailable(format!("{}: {}", path.display(), e))
        };
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(unavailable)?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, width)))
            .map_err(unavailable)?
            .into_optimized()
            .map_err(unavailable)?
            .into_runnable()
            .map_err(unavailable)?;

        Ok(Self {
            model,
            columns,
            ordinals: ordinal_table(schema),
        })
    }
}

impl PriceModel for OnnxPriceModel {
    fn predict(&self, row: &ModelRow) -> Result<f64, InferenceError> {
        check_layout(row, &self.columns)?;
        let features = encode_row(row, &self.ordinals);
        let failed = |e: TractError| InferenceError::Model(e.to_string());

        let input = Tensor::from_shape(&[1, self.columns.len()], features.as_slice()).map_err(failed)?;
        let outputs = self.model.run(tvec!(input.into())).map_err(failed)?;
        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::Model("model returned no outputs".to_string()))?;
        let price = output
            .to_array_view::<f32>()
            .map_err(failed)?
            .iter()
            .next()
            .copied()
            .ok_or_else(|| InferenceError::Model("model returned an empty tensor".to_string()))?;
        Ok(f64::from(price))
    }
}

/// The model only understands rows in the column order it was exported with.
fn check_layout(row: &ModelRow, columns: &[String]) -> Result<(), InferenceError> {
    if row.len() != columns.len() {
        return Err(InferenceError::Model(format!(
            "expected {} columns, got {}",
            columns.len(),
            row.len()
        )));
    }
    match row.columns().zip(columns).find(|(got, want)| got != want) {
        Some((got, want)) => Err(InferenceError::Model(format!(
            "expected column `{}`, got `{}`",
            want, got
        ))),
        None => Ok(()),
    }
}

/// 1-based option positions for every choice column.
fn ordinal_table(schema: &FeatureSchema) -> HashMap<String, Vec<String>> {
    schema
        .iter()
        .filter_map(|spec| spec.options().map(|o| (spec.name.clone(), o.to_vec())))
        .collect()
}

/// Numeric encoding of a row: choices become their 1-based option position
/// (-1 when unseen), flags 1/0, numbers pass through.
fn encode_row(row: &ModelRow, ordinals: &HashMap<String, Vec<String>>) -> Vec<f32> {
    row.values()
        .map(|(column, value)| match value {
            FieldValue::Number(n) => *n as f32,
            FieldValue::Flag(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            FieldValue::Text(s) => ordinals
                .get(column)
                .and_then(|options| options.iter().position(|o| o == s))
                .map(|i| (i + 1) as f32)
                .unwrap_or(-1.0),
        })
        .collect()
}
