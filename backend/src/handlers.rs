use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::{Store, StoreError};
use crate::decode::{decode, first_values, group_pairs, BooleanPolicy, RawForm, ValidationError};
use crate::error::AppError;
use crate::features::FeatureSchema;
use crate::inference::{self, InferenceError, Prediction, PriceModel};
use crate::listing::ListingRecord;
use crate::views::{self, Notice, HOST_FIELD};

#[derive(Clone)]
pub struct AppState {
    pub schema: Arc<FeatureSchema>,
    pub store: Arc<Store>,
    pub model: Option<Arc<dyn PriceModel>>,
    pub boolean_policy: BooleanPolicy,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(show_form))
        .route("/add_listing", get(show_form).post(add_listing))
        .route("/predict", post(predict_price))
        .route("/predict-one", post(predict_price))
        .route("/listings/:id", get(show_listing))
        .route("/hosts/:id/listings", get(host_listings))
        .route("/reset", get(reset))
        .route("/examples", get(examples))
        .with_state(state)
}

async fn show_form(State(state): State<AppState>) -> Html<String> {
    Html(views::listing_page(&state.schema, &BTreeMap::new(), None).into_string())
}

/// Re-renders the submitted form with the validation message inline.
fn rejected_form(schema: &FeatureSchema, raw: &RawForm, err: &ValidationError) -> Response {
    log::info!("Rejected listing form field {}: {}", err.field(), err);
    let message = err.to_string();
    let page = views::listing_page(schema, &first_values(raw), Some(Notice::Error(&message)));
    (StatusCode::UNPROCESSABLE_ENTITY, Html(page.into_string())).into_response()
}

async fn add_listing(
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let mut raw = group_pairs(pairs);
    let host_name = take_host_name(&mut raw);

    let record = match decode(&raw, &state.schema, state.boolean_policy) {
        Ok(record) => record,
        Err(err) => return rejected_form(&state.schema, &raw, &err),
    };

    match save_listing(&state.store, &record, host_name.as_deref()) {
        Ok(id) => {
            log::info!("Saved listing {}", id);
            let mut values = record.form_values();
            if let Some(name) = host_name {
                values.insert(HOST_FIELD.to_string(), name);
            }
            let message = format!("Saved listing #{}", id);
            Html(
                views::listing_page(&state.schema, &values, Some(Notice::Info(&message)))
                    .into_string(),
            )
            .into_response()
        }
        Err(err) => AppError::from(err).into_response(),
    }
}

/// Removes the host field, which is not a listing attribute. A blank name
/// counts as no host.
fn take_host_name(raw: &mut RawForm) -> Option<String> {
    raw.remove(HOST_FIELD)
        .and_then(|values| values.into_iter().next())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn save_listing(store: &Store, record: &ListingRecord, host_name: Option<&str>) -> Result<i32, StoreError> {
    match host_name {
        Some(name) => store.save_with_host(record, name),
        None => store.save(record, None),
    }
}

async fn predict_price(
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let mut raw = group_pairs(pairs);
    // The shared form always submits the host field, even when blank.
    take_host_name(&mut raw);
    let record = match decode(&raw, &state.schema, state.boolean_policy) {
        Ok(record) => record,
        Err(err) => return rejected_form(&state.schema, &raw, &err),
    };
    match run_prediction(&state, record).await {
        Ok(price) => {
            log::info!("Predicted nightly price {}", price);
            price.formatted().into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// Prices a listing on the blocking pool so a slow model does not stall the runtime.
async fn run_prediction(state: &AppState, record: ListingRecord) -> Result<Prediction, AppError> {
    let model = state.model.clone().ok_or_else(|| {
        InferenceError::ModelUnavailable("no model was loaded at startup".to_string())
    })?;
    let schema = state.schema.clone();
    let price = tokio::task::spawn_blocking(move || {
        inference::predict(&record, &schema, model.as_ref())
    })
    .await
    .map_err(|e| AppError::Task(e.to_string()))??;
    Ok(price)
}

async fn show_listing(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = state.store.get(id)?;
    Ok(Json(json!({ "id": id, "listing": record })))
}

async fn host_listings(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<serde_json::Value>, AppError> {
    let listings = state.store.listings_for_host(id)?;
    Ok(Json(json!({ "host_id": id, "listings": listings })))
}

async fn reset(State(state): State<AppState>) -> Result<&'static str, AppError> {
    state.store.reset()?;
    Ok("Database reset")
}

/// Development smoke test: prices a fixed, fully populated listing.
async fn examples(State(state): State<AppState>) -> Result<String, AppError> {
    let price = run_prediction(&state, inference::example_listing()).await?;
    Ok(price.formatted())
}
