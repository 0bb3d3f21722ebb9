use diesel::prelude::*;
use serde::Serialize;

use crate::db::StoreError;
use crate::listing::{FieldValue, ListingRecord};
use crate::schema::{hosts, listings};

#[derive(Debug, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = hosts)]
pub struct Host {
    pub id: i32,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = hosts)]
pub struct NewHost<'a> {
    pub name: &'a str,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Queryable, Selectable, Identifiable, Associations)]
#[diesel(belongs_to(Host))]
#[diesel(table_name = listings)]
pub struct Listing {
    pub id: i32,
    pub host_id: Option<i32>,
    pub property_type: String,
    pub room_type: String,
    pub accommodates: f64,
    pub bathrooms: f64,
    pub bed_type: String,
    pub cancellation_policy: String,
    pub cleaning_fee: bool,
    pub city: String,
    pub instant_bookable: bool,
    pub number_of_reviews: f64,
    pub review_scores_rating: f64,
    pub bedrooms: f64,
    pub beds: f64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = listings)]
pub struct NewListing {
    pub host_id: Option<i32>,
    pub property_type: String,
    pub room_type: String,
    pub accommodates: f64,
    pub bathrooms: f64,
    pub bed_type: String,
    pub cancellation_policy: String,
    pub cleaning_fee: bool,
    pub city: String,
    pub instant_bookable: bool,
    pub number_of_reviews: f64,
    pub review_scores_rating: f64,
    pub bedrooms: f64,
    pub beds: f64,
    pub created_at: i64,
}

impl NewListing {
    /// Maps a decoded listing onto the row layout. A field that is absent
    /// or of the wrong type violates the column's domain.
    pub fn from_record(
        record: &ListingRecord,
        host_id: Option<i32>,
        created_at: i64,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            host_id,
            property_type: text(record, "property_type")?,
            room_type: text(record, "room_type")?,
            accommodates: number(record, "accommodates")?,
            bathrooms: number(record, "bathrooms")?,
            bed_type: text(record, "bed_type")?,
            cancellation_policy: text(record, "cancellation_policy")?,
            cleaning_fee: flag(record, "cleaning_fee")?,
            city: text(record, "city")?,
            instant_bookable: flag(record, "instant_bookable")?,
            number_of_reviews: number(record, "number_of_reviews")?,
            review_scores_rating: number(record, "review_scores_rating")?,
            bedrooms: number(record, "bedrooms")?,
            beds: number(record, "beds")?,
            created_at,
        })
    }
}

impl Listing {
    pub fn into_record(self) -> ListingRecord {
        ListingRecord::new()
            .with("property_type", FieldValue::Text(self.property_type))
            .with("room_type", FieldValue::Text(self.room_type))
            .with("accommodates", FieldValue::Number(self.accommodates))
            .with("bathrooms", FieldValue::Number(self.bathrooms))
            .with("bed_type", FieldValue::Text(self.bed_type))
            .with("cancellation_policy", FieldValue::Text(self.cancellation_policy))
            .with("cleaning_fee", FieldValue::Flag(self.cleaning_fee))
            .with("city", FieldValue::Text(self.city))
            .with("instant_bookable", FieldValue::Flag(self.instant_bookable))
            .with("number_of_reviews", FieldValue::Number(self.number_of_reviews))
            .with("review_scores_rating", FieldValue::Number(self.review_scores_rating))
            .with("bedrooms", FieldValue::Number(self.bedrooms))
            .with("beds", FieldValue::Number(self.beds))
    }
}

fn field<'a>(record: &'a ListingRecord, column: &str) -> Result<&'a FieldValue, StoreError> {
    record
        .get(column)
        .ok_or_else(|| StoreError::Integrity(format!("listing has no `{}`", column)))
}

fn text(record: &ListingRecord, column: &str) -> Result<String, StoreError> {
    field(record, column)?
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| StoreError::Integrity(format!("`{}` must be text", column)))
}

fn number(record: &ListingRecord, column: &str) -> Result<f64, StoreError> {
    field(record, column)?
        .as_number()
        .ok_or_else(|| StoreError::Integrity(format!("`{}` must be a number", column)))
}

fn flag(record: &ListingRecord, column: &str) -> Result<bool, StoreError> {
    field(record, column)?
        .as_flag()
        .ok_or_else(|| StoreError::Integrity(format!("`{}` must be a boolean", column)))
}
