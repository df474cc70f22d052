use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use lifelink_match::config::{BusBackend, ModelKind, Settings, StoreBackend};
use lifelink_match::core::{Engine, EngineError, ScoringModel};
use lifelink_match::routes::{self, AppState};
use lifelink_match::services::{
    BusError, EventBus, Gateway, LinearModel, LocalBus, MemoryStore, PostgresStore, RedisBus,
    RemoteModel, StoreError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle malformed path segments such as a non-numeric id
pub fn handle_path_error(err: error::PathError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_path".to_string(),
        message: format!("Invalid path: {}", err),
        status_code: 400,
    }
    .into()
}

async fn build_gateway(settings: &Settings) -> Result<Arc<dyn Gateway>, StoreError> {
    match settings.database.backend {
        StoreBackend::Memory => {
            info!("Using in-memory record store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PostgresStore::from_settings(
                &settings.database.url,
                settings.database.max_connections,
                settings.database.min_connections,
                settings.database.acquire_timeout_secs,
            )
            .await?;
            info!(
                "PostgreSQL store initialized (max: {} connections)",
                settings.database.max_connections.unwrap_or(10)
            );
            Ok(Arc::new(store))
        }
    }
}

async fn build_bus(settings: &Settings) -> Result<Arc<dyn EventBus>, BusError> {
    match settings.bus.backend {
        BusBackend::Local => {
            info!("Using in-process event bus (capacity {})", settings.bus.channel_capacity);
            Ok(Arc::new(LocalBus::new(settings.bus.channel_capacity)))
        }
        BusBackend::Redis => {
            let bus = RedisBus::new(&settings.bus.redis_url).await?;
            info!("Redis event bus connected");
            Ok(Arc::new(bus))
        }
    }
}

async fn build_model(settings: &Settings) -> Result<Arc<dyn ScoringModel>, EngineError> {
    let model: Arc<dyn ScoringModel> = match settings.scoring.model {
        ModelKind::Linear => Arc::new(LinearModel::load(&settings.scoring.artifact_path)?),
        ModelKind::Remote => {
            let endpoint = settings.scoring.endpoint.as_deref().ok_or_else(|| {
                EngineError::ScoringUnavailable("scoring.endpoint is required for the remote model".to_string())
            })?;
            let timeout = Duration::from_secs(settings.scoring.timeout_secs);
            Arc::new(RemoteModel::connect(endpoint, timeout).await?)
        }
    };

    info!("Scoring model '{}' ready", model.name());
    Ok(model)
}

fn startup_error(component: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("Failed to initialize {}: {}", component, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{} initialization failed: {}", component, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Initialize logging
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }

    info!("Starting LifeLink match service...");

    let settings = Settings::load().map_err(|e| startup_error("configuration", e))?;

    info!("Configuration loaded successfully");

    let gateway = build_gateway(&settings)
        .await
        .map_err(|e| startup_error("record store", e))?;
    let bus = build_bus(&settings)
        .await
        .map_err(|e| startup_error("event bus", e))?;
    let model = build_model(&settings)
        .await
        .map_err(|e| startup_error("scoring model", e))?;

    let app_state = AppState {
        engine: Arc::new(Engine::new(gateway, bus, model)),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
