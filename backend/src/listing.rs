use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A single coerced form value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// Typed values of one submitted listing, keyed by feature name.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ListingRecord {
    values: BTreeMap<String, FieldValue>,
}

impl ListingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.values.insert(name.into(), value)
    }

    pub fn with(mut self, name: &str, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// String form of every value, used to pre-fill the next form.
    pub fn form_values(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_echo_without_fraction() {
        assert_eq!(FieldValue::Number(16.0).to_string(), "16");
        assert_eq!(FieldValue::Number(1.5).to_string(), "1.5");
        assert_eq!(FieldValue::Flag(false).to_string(), "false");
    }

    #[test]
    fn serializes_as_plain_object() {
        let record = ListingRecord::new()
            .with("city", FieldValue::Text("NYC".into()))
            .with("beds", FieldValue::Number(2.0))
            .with("cleaning_fee", FieldValue::Flag(true));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"city": "NYC", "beds": 2.0, "cleaning_fee": true})
        );
    }

    #[test]
    fn form_values_cover_every_field() {
        let record = ListingRecord::new()
            .with("city", FieldValue::Text("LA".into()))
            .with("bathrooms", FieldValue::Number(1.5));
        let values = record.form_values();
        assert_eq!(values["city"], "LA");
        assert_eq!(values["bathrooms"], "1.5");
        assert_eq!(values.len(), 2);
    }
}
