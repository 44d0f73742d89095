mod config;
mod error;
mod pipeline;
mod routes;

use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use rand::SeedableRng;
use rand::rngs::StdRng;

use config::AppConfig;
use pipeline::face::{CascadeDetector, FaceDetector, TorchDetector};
use pipeline::{Classifier, FaceLocator, Pipeline};
use routes::configure_routes;

/// Primary detector preferred; the cascade is consulted only when the
/// primary fails to initialize here. A later per-call failure of the
/// primary is surfaced to the caller, not rerouted.
fn init_face_locator(config: &AppConfig) -> FaceLocator {
    match TorchDetector::load(&config.detector_path) {
        Ok(detector) => {
            log::info!("Face detector initialized from {}", config.detector_path);
            return FaceLocator::new(Arc::new(detector) as Arc<dyn FaceDetector>);
        }
        Err(e) => {
            log::warn!(
                "Primary face detector failed to initialize ({e}); \
                 falling back to cascade detector"
            );
        }
    }

    match CascadeDetector::load(&config.cascade_model_path) {
        Ok(detector) => {
            log::info!(
                "Cascade face detector initialized from {}",
                config.cascade_model_path
            );
            FaceLocator::new(Arc::new(detector) as Arc<dyn FaceDetector>)
        }
        Err(e) => {
            log::error!("Error initializing face detector: {e}");
            FaceLocator::unavailable()
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env();

    let locator = init_face_locator(&config);
    let classifier = Classifier::load(&config.model_path, StdRng::from_os_rng());
    let pipeline = Arc::new(Pipeline::new(locator, classifier));

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(pipeline.clone()))
            .app_data(web::PayloadConfig::new(config::MAX_UPLOAD_BYTES))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
