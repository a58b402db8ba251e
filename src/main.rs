use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::from_fn,
    response::{Html, IntoResponse},
    routing::{get, post, put},
    Router,
};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zerowaste_connect::{auth, db, feed::DonationFeed, routes, storage, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    env::var("JWT_SECRET").expect("JWT_SECRET must be set");

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG")
                .unwrap_or_else(|_| "zerowaste_connect=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ZeroWaste Connect...");

    let index_template = fs::read_to_string("static/index.html")?;

    tracing::info!("Initializing database connection pool...");
    let db_pool = db::init_pool().await?;

    let op = storage::init_operator()?;

    let state = AppState {
        db: db_pool,
        storage: op,
        feed: DonationFeed::new(),
        index_template,
    };

    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(
                env::var("RATE_LIMIT_PER_SECOND")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1200),
            )
            .burst_size(
                env::var("RATE_LIMIT_BURST")
                    .ok()
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(2400),
            )
            .finish()
            .expect("governor config"),
    );

    let cors = build_cors_layer();

    let app = Router::new()
        .route("/", get(serve_index))
        .route("/index.html", get(serve_index))
        .route("/health", get(health_check))
        // API routes
        .route(
            "/api/donations",
            get(routes::donations::list_donations).post(routes::donations::create_donation),
        )
        .route("/api/donations/live", get(routes::live::donations_feed))
        .route(
            "/api/donations/{id}/status",
            put(routes::donations::update_status),
        )
        .route("/api/donations/demo", post(routes::donations::seed_demo_donations))
        .route("/api/ai/analyze", post(routes::ai::analyze))
        .route("/api/me", get(auth::me))
        // Auth routes
        .route("/auth/login/{provider}", get(auth::login))
        .route("/auth/callback/{provider}", get(auth::callback))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/dev/login", post(auth::dev_login))
        .nest_service("/js", ServeDir::new("static/js"))
        .nest_service("/css", ServeDir::new("static/css"))
        .fallback(get(spa_fallback))
        .layer(axum::extract::DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(from_fn(auth::require_auth))
        .layer(cors)
        .layer(GovernorLayer::new(governor_config))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

fn build_cors_layer() -> CorsLayer {
    let env_mode = env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string());
    let origins = env::var("ALLOWED_ORIGINS")
        .ok()
        .map(|v| {
            v.split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    if trimmed.is_empty() {
                        return None;
                    }
                    match trimmed.parse::<HeaderValue>() {
                        Ok(value) => Some(value),
                        Err(_) => {
                            tracing::warn!("Ignoring invalid ALLOWED_ORIGINS entry: {}", trimmed);
                            None
                        }
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty())
        .unwrap_or_else(|| {
            if env_mode == "production" {
                panic!("ALLOWED_ORIGINS must contain at least one valid origin in production")
            }
            vec![
                HeaderValue::from_static("http://localhost:8080"),
                HeaderValue::from_static("http://127.0.0.1:8080"),
            ]
        });

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}

async fn health_check() -> &'static str {
    "OK"
}

async fn serve_index(State(state): State<AppState>) -> impl IntoResponse {
    Html(state.index_template.clone())
}

async fn spa_fallback(State(state): State<AppState>, req: Request<Body>) -> impl IntoResponse {
    if req.uri().path().starts_with("/api/") {
        return StatusCode::NOT_FOUND.into_response();
    }
    serve_index(State(state)).await.into_response()
}
