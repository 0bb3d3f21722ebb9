use std::sync::Arc;

mod config;
mod db;
mod decode;
mod error;
mod features;
mod handlers;
mod inference;
mod listing;
mod models;
mod schema;
mod views;

use inference::{OnnxPriceModel, PriceModel};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = config::AppConfig::load()?;
    log::info!("Loaded config: {:?}", config);

    let schema = Arc::new(features::load_schema()?);
    log::info!(
        "Feature schema v{} with {} features",
        schema.version(),
        schema.len()
    );

    let store = db::Store::open(config.database_path(), &schema)?;
    store.init()?;
    log::info!("Database ready with {} listings", store.count_listings()?);

    let model: Option<Arc<dyn PriceModel>> =
        match OnnxPriceModel::load(&config.model_path, &schema) {
            Ok(model) => {
                log::info!("Loaded price model from {}", config.model_path.display());
                Some(Arc::new(model))
            }
            Err(e) => {
                log::warn!("{}; price predictions are disabled", e);
                None
            }
        };

    let state = handlers::AppState {
        schema,
        store: Arc::new(store),
        model,
        boolean_policy: config.boolean_policy,
    };
    let app = handlers::router(state);

    let addr = config.bind_addr();
    log::info!("Starting server on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app.into_make_service()).await?;

    Ok(())
}
