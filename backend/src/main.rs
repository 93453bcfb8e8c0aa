use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use backend::model::service::ModelService;
use backend::routes::configure_routes;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let static_dir = env::var("STATIC_DIR").unwrap_or_else(|_| {
        if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
            format!("{}/static", manifest_dir)
        } else {
            "/app/static".to_string()
        }
    });

    let service = web::Data::new(ModelService::from_env());

    // The weights artifact arrives out-of-band; a missing or broken file is
    // an expected condition, so a failed startup load only warns and the
    // first request retries.
    match service.ensure_loaded() {
        Ok(()) => log::info!("Model preloaded at startup"),
        Err(e) => log::warn!("Model not preloaded ({e}); will retry on first request"),
    }

    let port = env::var("PORT").unwrap_or_else(|_| "7860".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting server on {}", bind_address);
    log::info!("Routes: POST /api/predict, GET /api/test, GET /");

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(service.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
