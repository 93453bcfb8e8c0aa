use actix_web::{test, web, App};
use backend::model::error::ModelError;
use backend::model::predict::{Classifier, RawLogits};
use backend::model::service::ModelService;
use backend::routes::configure_routes;
use image::{Rgb, RgbImage};
use shared::{ErrorResponse, HealthResponse, PredictionResponse};
use std::io::Cursor;
use tch::Tensor;

struct FixedLogits;

impl Classifier for FixedLogits {
    fn image_size(&self) -> i64 {
        224
    }

    fn raw_forward(&self, _input: &Tensor) -> Result<RawLogits, ModelError> {
        Ok(RawLogits {
            disease: Tensor::from_slice(&[5.0f32, 0.0, 0.0, 0.0, 0.0]).unsqueeze(0),
            stage: Tensor::from_slice(&[5.0f32, 0.0, 0.0]).unsqueeze(0),
            combined: Tensor::from_slice(&[5.0f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
                .unsqueeze(0),
        })
    }
}

fn gray_png() -> Vec<u8> {
    let img = RgbImage::from_pixel(10, 10, Rgb([128, 128, 128]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn multipart_body(file_bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"img.png\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(file_bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (
        format!("multipart/form-data; boundary={boundary}"),
        body,
    )
}

fn static_dir() -> String {
    format!("{}/static", env!("CARGO_MANIFEST_DIR"))
}

#[actix_web::test]
async fn health_endpoint_reports_ok() {
    let service = web::Data::new(ModelService::preloaded(Box::new(FixedLogits)));
    let app = test::init_service(
        App::new()
            .app_data(service)
            .configure(|cfg| configure_routes(cfg, static_dir())),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/test").to_request();
    let resp: HealthResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp.status, "ok");
}

#[actix_web::test]
async fn predict_returns_contract_json() {
    let service = web::Data::new(ModelService::preloaded(Box::new(FixedLogits)));
    let app = test::init_service(
        App::new()
            .app_data(service)
            .configure(|cfg| configure_routes(cfg, static_dir())),
    )
    .await;

    let (content_type, body) = multipart_body(&gray_png());
    let req = test::TestRequest::post()
        .uri("/api/predict")
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    let resp: PredictionResponse = test::call_and_read_body_json(&app, req).await;

    assert!(resp.success);
    assert_eq!(resp.disease, "allergic_dermatitis");
    assert_eq!(resp.stage, "mild");
    let expected = (5.0f32.exp() / (5.0f32.exp() + 4.0)) * 100.0;
    assert!((resp.disease_confidence - expected).abs() < 0.01);
    assert_eq!(resp.all_disease_probabilities.len(), 5);
    assert_eq!(resp.all_stage_probabilities.len(), 3);
    let total: f32 = resp.all_disease_probabilities.values().sum();
    assert!((total - 100.0).abs() < 1e-3);
}

#[actix_web::test]
async fn predict_without_model_is_service_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let locator = backend::model::locator::LocatorConfig {
        filename: "model.safetensors".to_string(),
        extension: "safetensors".to_string(),
        search_roots: vec![dir.path().to_path_buf()],
        max_depth: 2,
        fallback: backend::model::locator::FallbackPolicy::LargestFile,
    };
    let registry = backend::model::backbone::BackboneRegistry::new(vec![dir.path().to_path_buf()]);
    let service = web::Data::new(ModelService::new(locator, registry));
    let app = test::init_service(
        App::new()
            .app_data(service)
            .configure(|cfg| configure_routes(cfg, static_dir())),
    )
    .await;

    let (content_type, body) = multipart_body(&gray_png());
    let req = test::TestRequest::post()
        .uri("/api/predict")
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    let err: ErrorResponse = test::read_body_json(resp).await;
    assert!(err.error.contains("model.safetensors"));
}

#[actix_web::test]
async fn undecodable_upload_is_internal_error() {
    let service = web::Data::new(ModelService::preloaded(Box::new(FixedLogits)));
    let app = test::init_service(
        App::new()
            .app_data(service)
            .configure(|cfg| configure_routes(cfg, static_dir())),
    )
    .await;

    let (content_type, body) = multipart_body(b"not an image at all");
    let req = test::TestRequest::post()
        .uri("/api/predict")
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.status(),
        actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
    );
    let err: ErrorResponse = test::read_body_json(resp).await;
    assert!(err.error.contains("decode"));
}

#[actix_web::test]
async fn missing_image_part_is_bad_request() {
    let service = web::Data::new(ModelService::preloaded(Box::new(FixedLogits)));
    let app = test::init_service(
        App::new()
            .app_data(service)
            .configure(|cfg| configure_routes(cfg, static_dir())),
    )
    .await;

    let (content_type, body) = multipart_body(&[]);
    let req = test::TestRequest::post()
        .uri("/api/predict")
        .insert_header(("content-type", content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    let err: ErrorResponse = test::read_body_json(resp).await;
    assert!(!err.error.is_empty());
}
