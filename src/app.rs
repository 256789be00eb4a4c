use crate::config::Config;
use crate::discovery::{DiscoveryController, DiscoveryView};
use crate::error::CatalogError;
use crate::favorites::FavoritesStore;
use crate::models::{Genre, MovieSummary, QueryIntent};
use crate::overview::load_overview;
use crate::storage::{FileStore, KeyValueStore};
use crate::tmdb::{CatalogApi, TmdbClient};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogApi>,
    pub discovery: DiscoveryController,
    pub favorites: Arc<FavoritesStore>,
    pub genres: Arc<OnceCell<Vec<Genre>>>,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        discovery: DiscoveryController,
        favorites: Arc<FavoritesStore>,
    ) -> Self {
        Self {
            catalog,
            discovery,
            favorites,
            genres: Arc::new(OnceCell::new()),
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let catalog: Arc<dyn CatalogApi> = Arc::new(TmdbClient::new(
        config.tmdb_api_key.clone(),
        config.tmdb_base_url.clone(),
    )?);
    let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.data_dir.clone()));
    let favorites = Arc::new(FavoritesStore::load(storage));
    let discovery = DiscoveryController::new(catalog.clone(), config.discovery.clone());
    discovery.set_intent(QueryIntent::Popular);

    let state = AppState::new(catalog, discovery, favorites);
    let app = build_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    info!("Listening on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/discover", get(discover_view))
        .route("/discover/intent", post(set_intent))
        .route("/discover/more", post(advance_page))
        .route("/genres", get(genres))
        .route("/movies/top-rated", get(top_rated))
        .route("/movies/upcoming", get(upcoming))
        .route("/movies/:id", get(movie_overview))
        .route("/favorites", get(list_favorites))
        .route("/favorites/toggle", post(toggle_favorite))
        .route("/favorites/:id", get(favorite_status))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn discover_view(State(state): State<AppState>) -> Json<DiscoveryView> {
    Json(state.discovery.view())
}

#[derive(Debug, Default, Deserialize)]
struct IntentRequest {
    search: Option<String>,
    genre: Option<u32>,
}

async fn set_intent(
    State(state): State<AppState>,
    Json(body): Json<IntentRequest>,
) -> Json<DiscoveryView> {
    let intent = QueryIntent::from_inputs(body.search.as_deref(), body.genre);
    info!("Discover intent set to {}", intent.label());
    state.discovery.set_intent(intent);
    Json(state.discovery.view())
}

async fn advance_page(State(state): State<AppState>) -> Response {
    let accepted = state.discovery.advance_page();
    let status = if accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(json!({ "accepted": accepted, "view": state.discovery.view() })),
    )
        .into_response()
}

async fn genres(State(state): State<AppState>) -> Response {
    let catalog = state.catalog.clone();
    match state
        .genres
        .get_or_try_init(|| async move { catalog.fetch_genres().await })
        .await
    {
        Ok(genres) => Json(genres.clone()).into_response(),
        Err(e) => catalog_failure("genres", e),
    }
}

async fn top_rated(State(state): State<AppState>) -> Response {
    match state.catalog.fetch_top_rated(1).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => catalog_failure("top rated", e),
    }
}

async fn upcoming(State(state): State<AppState>) -> Response {
    match state.catalog.fetch_upcoming().await {
        Ok(page) => Json(page).into_response(),
        Err(e) => catalog_failure("upcoming", e),
    }
}

async fn movie_overview(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match load_overview(state.catalog.as_ref(), id).await {
        Ok(overview) => Json(overview).into_response(),
        Err(e) => catalog_failure("movie overview", e),
    }
}

async fn list_favorites(State(state): State<AppState>) -> Json<Vec<MovieSummary>> {
    Json(state.favorites.favorites())
}

async fn favorite_status(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    Json(json!({ "id": id, "is_favorite": state.favorites.is_favorite(id) })).into_response()
}

async fn toggle_favorite(
    State(state): State<AppState>,
    Json(movie): Json<MovieSummary>,
) -> Response {
    let title = movie.title.clone();
    // The snapshot write is blocking file I/O.
    let favorites = state.favorites.clone();
    let outcome = match tokio::task::spawn_blocking(move || favorites.toggle_favorite(movie)).await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Favorite toggle task failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": "favorite toggle failed" })),
            )
                .into_response();
        }
    };
    info!(
        "Favorite '{}' {}",
        title,
        if outcome.is_favorite { "added" } else { "removed" }
    );
    Json(outcome).into_response()
}

fn catalog_failure(what: &str, err: CatalogError) -> Response {
    let status = match &err {
        CatalogError::Status { status: 404, .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    };
    error!("Failed to load {}: {}", what, err);
    (
        status,
        Json(json!({ "status": "error", "kind": err.kind(), "message": err.to_string() })),
    )
        .into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
