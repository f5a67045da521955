use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use animal_catalog_api::{AnimalCatalogApi, CreateOutcome};
use animal_catalog_core::{is_valid_animal, Animal, AnimalQuery};
use animal_catalog_store_json::{AnimalStore, JsonFileStore};
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, get_service};
use axum::{Json, Router};
use clap::Parser;
use serde_json::{Map, Value};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 3009;
const BUNDLED_DATASET: &str = include_str!("../../../data/animals.json");
const NOT_PROPERLY_FORMATTED: &str = "The animal is not properly formatted.";

#[derive(Debug, Clone)]
struct ServiceState {
    api: AnimalCatalogApi,
    public_dir: PathBuf,
}

#[derive(Debug, Clone)]
struct ServiceError {
    status: StatusCode,
    message: String,
}

#[derive(Debug, Parser)]
#[command(name = "animal-catalog-service")]
#[command(about = "HTTP service for the animal catalog")]
struct Args {
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,
    /// Dataset file read at startup and rewritten on every create.
    #[arg(long, env = "ANIMALS_DATA", default_value = "./data/animals.json")]
    data: PathBuf,
    #[arg(long = "public", env = "ANIMALS_PUBLIC_DIR", default_value = "./public")]
    public_dir: PathBuf,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl ServiceError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    fn internal(err: &anyhow::Error) -> Self {
        error!(error = %format!("{err:#}"), "request failed");
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: err.to_string() }
    }
}

fn app(state: ServiceState) -> Router {
    let public_dir = state.public_dir.clone();
    let index = ServeFile::new(public_dir.join("index.html"));

    Router::new()
        .route("/api/animals", get(list_animals).post(create_animal))
        .route("/api/animals/:id", get(show_animal))
        .route("/", get_service(index.clone()))
        .route("/animals", get_service(ServeFile::new(public_dir.join("animals.html"))))
        .route("/zookeepers", get_service(ServeFile::new(public_dir.join("zookeepers.html"))))
        .fallback_service(ServeDir::new(&public_dir).fallback(index))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let store: Arc<dyn AnimalStore> =
        Arc::new(JsonFileStore::new(&args.data).with_seed(BUNDLED_DATASET));
    let api = AnimalCatalogApi::open(store).context("failed to load animal catalog")?;
    let state = ServiceState { api, public_dir: args.public_dir };

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "API server now on port {}", args.port);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("animal_catalog_service=info,animal_catalog_api=info,tower_http=info")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn list_animals(
    State(state): State<ServiceState>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<Animal>>, ServiceError> {
    let query = query
        .map(|raw| AnimalQuery::from_pairs(url::form_urlencoded::parse(raw.as_bytes())))
        .unwrap_or_default();
    let animals = state.api.list_animals(&query).map_err(|err| ServiceError::internal(&err))?;
    Ok(Json(animals))
}

async fn show_animal(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let animal = state.api.find_animal(&id).map_err(|err| ServiceError::internal(&err))?;
    Ok(match animal {
        Some(animal) => Json(animal).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

async fn create_animal(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let candidate = decode_candidate(&headers, &body)?;
    if !is_valid_animal(&candidate) {
        return Ok(not_properly_formatted());
    }

    let outcome = state.api.create_animal(&candidate).map_err(|err| ServiceError::internal(&err))?;
    Ok(match outcome {
        CreateOutcome::Created(animal) => Json(animal).into_response(),
        CreateOutcome::Rejected(_) => not_properly_formatted(),
    })
}

fn not_properly_formatted() -> Response {
    (StatusCode::NOT_FOUND, NOT_PROPERLY_FORMATTED).into_response()
}

/// Turn a request body into a candidate object. Bodies of other content types are
/// treated as an empty object, which then fails validation.
fn decode_candidate(headers: &HeaderMap, body: &[u8]) -> Result<Value, ServiceError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        return Ok(form_candidate(body));
    }
    if !content_type.starts_with("application/json") || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    serde_json::from_slice(body)
        .map_err(|err| ServiceError::bad_request(format!("malformed JSON body: {err}")))
}

/// Form bodies: a key that repeats or ends in `[]` becomes a list, a single plain key
/// stays a string.
fn form_candidate(body: &[u8]) -> Value {
    let mut fields = Map::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        let mut key = key.into_owned();
        let as_list = key.ends_with("[]");
        if as_list {
            key.truncate(key.len() - 2);
        }
        let value = Value::String(value.into_owned());

        match fields.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None if as_list => {
                fields.insert(key, Value::Array(vec![value]));
            }
            None => {
                fields.insert(key, value);
            }
        }
    }
    Value::Object(fields)
}
