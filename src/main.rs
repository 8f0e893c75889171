#[macro_use]
extern crate rocket;

mod api;
mod app_state;
mod config;
mod cors;
mod engine;
mod error;
mod orchestrator;
mod prompt;
mod safety;
mod severity;
mod types;

use std::sync::Arc;

use rocket::{Build, Rocket};
use tracing_subscriber::EnvFilter;

use api::{ask, bad_request, health, internal_error, not_found};
use app_state::AppState;
use config::AppConfig;
use cors::{preflight, Cors};

pub fn build_rocket(state: Arc<AppState>) -> Rocket<Build> {
    let cors = Cors::new(state.config.cors_allow_origin.clone());

    rocket::build()
        .attach(cors)
        .manage(state)
        .mount("/", routes![health, ask, preflight])
        .register("/", catchers![bad_request, not_found, internal_error])
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("med_ask_server=info,rocket=warn"));

    // Rocket 自己也会装 logger，这里用 try_init 避免重复初始化时 panic
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[launch]
fn rocket() -> _ {
    init_tracing();

    let config = AppConfig::from_env();
    tracing::info!(
        model = %config.hf.model_id,
        endpoint = %config.hf.api_url,
        timeout_ms = config.hf.timeout_ms,
        degrade_on_failure = config.degrade_on_failure,
        cors_allow_origin = %config.cors_allow_origin,
        "starting medical ask service"
    );

    build_rocket(AppState::new(config))
}
