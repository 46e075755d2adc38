//! OEE Monitor
//!
//! Manufacturing monitoring backend: machine records with Overall Equipment
//! Effectiveness scoring and health classification, served over REST.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod handlers;
mod models;
mod oee;
mod repository;
mod simulator;
mod state;
mod validation;

use crate::config::Settings;
use crate::simulator::ProductionSimulator;
use crate::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenv::dotenv().ok();

    // Logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,oee_monitor=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();

    // Load configuration
    let settings = Settings::from_env().context("Failed to load configuration")?;
    let bind_address = format!("{}:{}", settings.server.host, settings.server.port);

    info!("Starting OEE monitor backend");
    info!("Binding server to {}", bind_address);

    // Shared application state
    let app_state = AppState::new(settings.store.max_production_samples).shared();

    // ---------------------------------------------------------------------
    // Mock production feed
    // IMPORTANT: use actix_rt::spawn (NOT tokio::spawn)
    // ---------------------------------------------------------------------
    if settings.simulator.enabled {
        let simulator = ProductionSimulator::new(
            settings.simulator.interval_ms,
            settings.simulator.minutes_per_tick,
        )
        .context("Failed to initialize mock production feed")?;
        let feed_state = app_state.clone();

        actix_rt::spawn(async move {
            simulator.run(feed_state).await;
        });
    } else {
        info!("Mock production feed disabled");
    }

    // ---------------------------------------------------------------------
    // HTTP server
    // ---------------------------------------------------------------------
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(handlers::configure_routes)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server terminated with an error")
}
