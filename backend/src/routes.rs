use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{web, Error, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use shared::{ErrorResponse, HealthResponse, PredictionResponse};
use std::io::Write;

use crate::model::error::ModelError;
use crate::model::service::ModelService;

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: String) {
    cfg.service(web::resource("/api/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/api/test").route(web::get().to(handle_test)))
        .service(Files::new("/", static_dir).index_file("index.html"));
}

async fn handle_predict(
    service: web::Data<ModelService>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut image_data = Vec::new();
    while let Ok(Some(mut field)) = payload.try_next().await {
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            image_data.write_all(&data)?;
        }
        if !image_data.is_empty() {
            break;
        }
    }

    if image_data.is_empty() {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "no image uploaded".to_string(),
        }));
    }

    match service.predict(&image_data) {
        Ok(prediction) => {
            info!(
                "Prediction: {} / {} ({:.1}%)",
                prediction.disease, prediction.stage, prediction.disease_confidence
            );
            Ok(HttpResponse::Ok().json(PredictionResponse::from(prediction)))
        }
        Err(err) => {
            error!("Prediction failed: {err}");
            let body = ErrorResponse {
                error: err.to_string(),
            };
            let response = match err {
                ModelError::WeightsNotFound { .. } | ModelError::Load(_) => {
                    HttpResponse::ServiceUnavailable().json(body)
                }
                ModelError::Input(_) | ModelError::Inference(_) => {
                    HttpResponse::InternalServerError().json(body)
                }
            };
            Ok(response)
        }
    }
}

async fn handle_test() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        message: "API is working".to_string(),
    })
}
