use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use clinic_admin::auth::JwtAuth;
use clinic_admin::config::Settings;
use clinic_admin::crypto::FieldCipher;
use clinic_admin::database::{create_pool, run_migrations};
use clinic_admin::handlers::{self, AppState};
use clinic_admin::middleware::{AccessLog, RequestId, RequestSpan};
use clinic_admin::report_generator::{OpenAiReportGenerator, ReportGenerator};
use clinic_admin::{logging, metrics, user_service};
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new().expect("Failed to load configuration");

    // Initialize logging
    logging::init_logging(&settings.logging.log_dir, &settings.logging.level)
        .expect("Failed to initialize logging");
    metrics::init_metrics().expect("Failed to register metrics");

    info!("Clinic admin backend starting...");
    info!("Configuration loaded: {}", settings.server.bind_addr);

    // Create database pool
    info!("Connecting to PostgreSQL...");
    let pool = create_pool(&settings.database)
        .await
        .expect("Failed to create database pool");

    // Run migrations
    info!("Running database migrations...");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    // Initialize services
    let jwt_auth = Arc::new(JwtAuth::new(&settings.jwt));
    let cipher = Arc::new(FieldCipher::new(&settings.encryption.key));
    let generator: Arc<dyn ReportGenerator> = Arc::new(
        OpenAiReportGenerator::new(&settings.report).expect("Failed to build report generator client"),
    );

    user_service::ensure_admin(&pool, &cipher, &settings.bootstrap)
        .await
        .expect("Failed to bootstrap administrator account");

    let app_state = web::Data::new(AppState {
        pool: pool.clone(),
        jwt_auth,
        cipher,
        generator,
    });

    info!("All services initialized");
    info!("Starting server on {}", settings.server.bind_addr);

    let bind_addr = settings.server.bind_addr.clone();
    let cors_origins = settings.cors.allowed_origins.clone();

    HttpServer::new(move || {
        // CORS configuration
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
            ])
            .supports_credentials()
            .max_age(3600);

        for origin in &cors_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .wrap(AccessLog)
            .wrap(TracingLogger::<RequestSpan>::new())
            .wrap(RequestId)
            .wrap(cors)
            .app_data(app_state.clone())
            .configure(handlers::configure)
    })
    .workers(settings.server.workers.unwrap_or(4))
    .bind(bind_addr)?
    .run()
    .await
}
