//! Sponsorship Administration Backend
//!
//! REST backend for a student sponsorship program: students, sponsors, exams and their
//! year-scoped records, with SQLite persistence and a Tantivy directory search.

mod api;
mod audit;
mod auth;
mod config;
mod db;
mod errors;
mod mail;
mod maintenance;
mod models;
mod search;
mod versioning;
mod years;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use search::SearchIndex;
use versioning::{
    ExamScoreKind, LetterKind, StudentPhotoKind, StudentRecordKind, TimelineEventKind,
    VersionStore,
};
use years::AcademicYearAuthority;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub years: Arc<AcademicYearAuthority>,
    pub records: Arc<VersionStore>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sponsorship Administration Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (SPONSOR_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool.clone()));

    let years = Arc::new(AcademicYearAuthority::load(pool.clone()).await?);
    match years.selected() {
        Some(year) => tracing::info!("Current academic year: {}", year.year_name),
        None => tracing::warn!("No academic year configured yet"),
    }
    let records = Arc::new(VersionStore::new(pool, years.clone()));

    // Initialize search index
    let search = Arc::new(SearchIndex::open(&config.index_path)?);

    tracing::info!("Building search index...");
    let indexed = api::rebuild_directory(&repo, &search).await?;
    tracing::info!("Search index built with {} entries", indexed);

    // Student entries index the current record's school, so re-derive them on a year switch.
    let mut year_changes = years.subscribe();
    let (index_repo, index) = (repo.clone(), search.clone());
    tokio::spawn(async move {
        while year_changes.changed().await.is_ok() {
            if let Err(e) = api::rebuild_directory(&index_repo, &index).await {
                tracing::warn!("Failed to rebuild search index after year switch: {}", e);
            }
        }
    });

    let state = AppState {
        repo,
        years,
        records,
        search,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        .route("/revision", get(api::get_revision))
        .route("/dashboard", get(api::get_dashboard))
        .route("/search", get(api::search_directory))
        // Academic years
        .route(
            "/academic-years",
            get(api::list_academic_years).post(api::create_academic_year),
        )
        .route("/academic-years/current", get(api::get_current_academic_year))
        .route("/academic-years/warning", get(api::get_cross_year_warning))
        .route("/academic-years/{id}", put(api::update_academic_year))
        .route(
            "/academic-years/{id}/set-current",
            post(api::set_current_academic_year),
        )
        // Students
        .route("/students", get(api::list_students).post(api::create_student))
        .route(
            "/students/{id}",
            get(api::get_student)
                .put(api::update_student)
                .delete(api::delete_student),
        )
        .route(
            "/students/{id}/sponsor",
            put(api::assign_sponsor).delete(api::unassign_sponsor),
        )
        .route(
            "/students/{id}/records",
            get(api::get_record_history::<StudentRecordKind>).put(api::put_student_record),
        )
        .route(
            "/students/{id}/records/{year}",
            get(api::get_record_for_year::<StudentRecordKind>),
        )
        .route(
            "/students/{id}/photos",
            get(api::get_record_history::<StudentPhotoKind>)
                .put(api::put_record::<StudentPhotoKind>),
        )
        .route(
            "/students/{id}/relatives",
            get(api::list_relatives).post(api::create_relative),
        )
        .route("/relatives/{id}", delete(api::delete_relative))
        .route(
            "/students/{id}/timeline",
            get(api::list_student_timeline).post(api::create_student_timeline_event),
        )
        .route(
            "/students/{id}/letters",
            get(api::list_letters).post(api::create_letter),
        )
        // Versioned records anchored to other rows
        .route(
            "/exam-scores/{id}/records",
            get(api::get_record_history::<ExamScoreKind>).put(api::put_exam_score_record),
        )
        .route(
            "/letters/{id}/records",
            get(api::get_record_history::<LetterKind>).put(api::put_record::<LetterKind>),
        )
        .route(
            "/timeline-events/{id}/records",
            get(api::get_record_history::<TimelineEventKind>)
                .put(api::put_record::<TimelineEventKind>),
        )
        // Sponsors
        .route("/sponsors", get(api::list_sponsors).post(api::create_sponsor))
        .route(
            "/sponsors/{id}",
            get(api::get_sponsor)
                .put(api::update_sponsor)
                .delete(api::delete_sponsor),
        )
        .route("/sponsors/{id}/students", get(api::list_sponsor_students))
        .route(
            "/sponsors/{id}/timeline",
            get(api::list_sponsor_timeline).post(api::create_sponsor_timeline_event),
        )
        // Exams
        .route("/exams", get(api::list_exams).post(api::create_exam))
        .route(
            "/exams/{id}",
            get(api::get_exam)
                .put(api::update_exam)
                .delete(api::delete_exam),
        )
        .route(
            "/exams/{id}/scores",
            get(api::list_exam_scores).post(api::create_exam_score),
        )
        // Administration
        .route("/profiles", get(api::list_profiles).post(api::create_profile))
        .route("/profiles/{id}/role", put(api::update_profile_role))
        .route("/settings", get(api::list_settings))
        .route("/settings/email/test", post(api::send_test_email))
        .route("/settings/{key}", put(api::put_setting))
        .route("/audit-logs", get(api::list_audit_logs))
        .route("/maintenance/backup", post(api::backup))
        .route("/maintenance/restore", post(api::restore))
        .route("/maintenance/factory-reset", post(api::factory_reset))
        // Actor resolution runs inside the PSK check
        .layer(middleware::from_fn_with_state(
            state.repo.clone(),
            auth::actor_layer,
        ))
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
