use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::IntoResponse;
use concierge_backend::config::Config;
use concierge_backend::db::{
    inventory_repository::InventoryRepository,
    payment_record_repository::PaymentRecordRepository,
    postgres_inventory_repository::PostgresInventoryRepository,
    postgres_payment_record_repository::PostgresPaymentRecordRepository,
    postgres_user_repository::PostgresUserRepository, user_repository::UserRepository,
};
use concierge_backend::responses::JsonResponse;
use concierge_backend::routes;
use concierge_backend::services::smtp_mailer::SmtpMailer;
use concierge_backend::services::stripe::LiveStripeService;
use concierge_backend::utils::jwt::SessionTokens;
use concierge_backend::AppState;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(Config::from_env().context("invalid configuration")?);
    let tokens = Arc::new(SessionTokens::from_config(&config).context("invalid JWT settings")?);

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(20);
    let global_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .context("invalid rate limiter settings")?,
    );

    let governor_limiter = global_governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let pg_pool = establish_connection(&config.database_url).await?;

    let state = AppState {
        db: Arc::new(PostgresUserRepository {
            pool: pg_pool.clone(),
        }) as Arc<dyn UserRepository>,
        payments: Arc::new(PostgresPaymentRecordRepository {
            pool: pg_pool.clone(),
        }) as Arc<dyn PaymentRecordRepository>,
        inventory: Arc::new(PostgresInventoryRepository { pool: pg_pool }) as Arc<dyn InventoryRepository>,
        mailer: Arc::new(SmtpMailer::new().context("failed to initialize mailer")?),
        stripe: Arc::new(LiveStripeService::from_settings(&config.stripe)),
        config: config.clone(),
        tokens,
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .trim_end_matches('/')
                .parse::<HeaderValue>()
                .context("FRONTEND_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("stripe-signature"),
        ])
        .allow_credentials(true);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: global_governor_conf,
        })
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "concierge backend listening");
    axum::serve(listener, make_service).await?;
    Ok(())
}

/// Connects, verifies the connection and applies pending migrations.
async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    info!("connected to the database");
    Ok(pool)
}
