use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use log::info;
use serde_json::json;
use shared::{BatchResponse, HealthResponse};

use crate::config;
use crate::error::ApiError;
use crate::pipeline::{BatchInput, Pipeline, encode};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/api/health").route(web::get().to(health_check)))
        .service(web::resource("/api/predict").route(web::post().to(predict)))
        .service(web::resource("/api/batch-predict").route(web::post().to(batch_predict)));
}

/// One file pulled out of a multipart stream.
struct UploadedFile {
    field_name: String,
    filename: Option<String>,
    bytes: Vec<u8>,
}

/// Drain every multipart field into memory, enforcing the upload cap
/// per file.
async fn read_multipart(mut payload: Multipart) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();

    while let Ok(Some(mut field)) = payload.try_next().await {
        let (field_name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().unwrap_or_default().to_string(),
                cd.get_filename().map(str::to_string),
            ),
            None => continue,
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::Internal(e.to_string()))?;
            if bytes.len() + chunk.len() > config::MAX_UPLOAD_BYTES {
                return Err(ApiError::Validation(
                    "File too large (max 16 MiB)".to_string(),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        files.push(UploadedFile {
            field_name,
            filename,
            bytes,
        });
    }

    Ok(files)
}

async fn home() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Deepfake Detection API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "/api/predict": "POST - Upload image for deepfake detection",
            "/api/batch-predict": "POST - Upload up to 10 images for detection",
            "/api/health": "GET - Check API health status"
        }
    }))
}

async fn health_check(pipeline: web::Data<Arc<Pipeline>>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: pipeline.model_loaded(),
        face_detector_loaded: pipeline.detector_loaded(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn predict(
    pipeline: web::Data<Arc<Pipeline>>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let files = read_multipart(payload).await?;
    let file = files
        .into_iter()
        .find(|f| f.field_name == "file")
        .ok_or_else(|| ApiError::Validation("No file provided".to_string()))?;

    let filename = file.filename.unwrap_or_default();
    if filename.is_empty() {
        return Err(ApiError::Validation("No file selected".to_string()));
    }
    if !config::allowed_file(&filename) {
        return Err(ApiError::Validation(
            "Invalid file type. Allowed: PNG, JPG, JPEG".to_string(),
        ));
    }
    if file.bytes.is_empty() {
        return Err(ApiError::Validation("Empty file".to_string()));
    }

    info!("Processing image: {filename}");
    let output = pipeline.process(&file.bytes)?;
    info!(
        "Prediction: {:?} ({:.2}%)",
        output.prediction.result, output.prediction.confidence
    );

    Ok(HttpResponse::Ok().json(encode::build_response(output)))
}

async fn batch_predict(
    pipeline: web::Data<Arc<Pipeline>>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let files = read_multipart(payload).await?;
    let items: Vec<BatchInput> = files
        .into_iter()
        .filter(|f| f.field_name == "files")
        .map(|f| BatchInput {
            filename: f.filename.unwrap_or_default(),
            bytes: f.bytes,
        })
        .collect();

    if items.is_empty() {
        return Err(ApiError::Validation("No files provided".to_string()));
    }

    let results = pipeline.process_batch(items)?;
    Ok(HttpResponse::Ok().json(BatchResponse {
        success: true,
        total_files: results.len(),
        results,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::face::RawDetection;
    use crate::pipeline::face::testutil::{StubDetector, detection};
    use crate::pipeline::{Classifier, FaceLocator, ModelState};
    use actix_web::{App, test};
    use image::RgbImage;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::Value;
    use std::io::Cursor;

    fn pipeline_with(detections: Vec<RawDetection>) -> web::Data<Arc<Pipeline>> {
        web::Data::new(Arc::new(Pipeline::new(
            FaceLocator::new(Arc::new(StubDetector(detections))),
            Classifier::new(ModelState::Unavailable, StdRng::seed_from_u64(42)),
        )))
    }

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_pixel(160, 160, image::Rgb([120, 110, 100]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Build a multipart/form-data request from (field, filename,
    /// bytes) parts.
    fn multipart_post(uri: &str, parts: &[(&str, &str, &[u8])]) -> test::TestRequest {
        let boundary = "testing-boundary";
        let mut body = Vec::new();
        for (name, filename, bytes) in parts {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; \
                     name=\"{name}\"; filename=\"{filename}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            ))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn home_describes_the_service() {
        let app = test::init_service(
            App::new()
                .app_data(pipeline_with(vec![]))
                .configure(configure_routes),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "running");
        assert!(body["endpoints"]["/api/predict"].is_string());
    }

    #[actix_web::test]
    async fn health_reports_dummy_mode() {
        let app = test::init_service(
            App::new()
                .app_data(pipeline_with(vec![]))
                .configure(configure_routes),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/health").to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], false);
        assert_eq!(body["face_detector_loaded"], true);
        assert!(body["timestamp"].is_string());
    }

    #[actix_web::test]
    async fn predict_returns_full_envelope() {
        let app = test::init_service(
            App::new()
                .app_data(pipeline_with(vec![detection(40, 40, 50, 50, 0.93)]))
                .configure(configure_routes),
        )
        .await;

        let req = multipart_post("/api/predict", &[("file", "face.png", &png_bytes())]);
        let resp = test::call_service(&app, req.to_request()).await;
        assert!(resp.status().is_success());

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["face_detection"]["box"], json!([20, 20, 90, 90]));
        assert_eq!(body["face_detection"]["num_faces"], 1);
        let fake = body["prediction"]["fake_probability"].as_f64().unwrap();
        let real = body["prediction"]["real_probability"].as_f64().unwrap();
        assert!((fake + real - 100.0).abs() < 1e-6);
        let result = body["prediction"]["result"].as_str().unwrap();
        assert!(result == "Real" || result == "Fake");
        assert!(
            body["face_crop"]
                .as_str()
                .unwrap()
                .starts_with("data:image/jpeg;base64,")
        );
        assert!(body["timestamp"].is_string());
    }

    #[actix_web::test]
    async fn predict_without_face_is_a_400_with_count() {
        let app = test::init_service(
            App::new()
                .app_data(pipeline_with(vec![]))
                .configure(configure_routes),
        )
        .await;

        let req = multipart_post("/api/predict", &[("file", "face.png", &png_bytes())]);
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), 400);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No face detected");
        assert_eq!(body["detected_faces"], 0);
    }

    #[actix_web::test]
    async fn predict_rejects_disallowed_extension() {
        let app = test::init_service(
            App::new()
                .app_data(pipeline_with(vec![detection(0, 0, 10, 10, 0.9)]))
                .configure(configure_routes),
        )
        .await;

        let req = multipart_post("/api/predict", &[("file", "clip.gif", &png_bytes())]);
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), 400);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid file type. Allowed: PNG, JPG, JPEG");
    }

    #[actix_web::test]
    async fn predict_without_file_field_is_a_400() {
        let app = test::init_service(
            App::new()
                .app_data(pipeline_with(vec![]))
                .configure(configure_routes),
        )
        .await;

        let req = multipart_post("/api/predict", &[("other", "face.png", &png_bytes())]);
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), 400);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No file provided");
    }

    #[actix_web::test]
    async fn batch_reports_each_item_in_order() {
        let app = test::init_service(
            App::new()
                .app_data(pipeline_with(vec![detection(30, 30, 60, 60, 0.9)]))
                .configure(configure_routes),
        )
        .await;

        let good = png_bytes();
        let req = multipart_post(
            "/api/batch-predict",
            &[
                ("files", "a.png", &good),
                ("files", "clip.gif", &good),
                ("files", "b.jpg", &good),
            ],
        );
        let resp = test::call_service(&app, req.to_request()).await;
        assert!(resp.status().is_success());

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["total_files"], 3);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["filename"], "a.png");
        assert!(results[0]["prediction"].is_object());
        assert_eq!(results[1]["filename"], "clip.gif");
        assert_eq!(results[1]["error"], "Invalid file type");
        assert_eq!(results[2]["filename"], "b.jpg");
        assert!(results[2]["prediction"].is_object());
    }

    #[actix_web::test]
    async fn batch_over_cap_is_rejected_wholesale() {
        let app = test::init_service(
            App::new()
                .app_data(pipeline_with(vec![detection(30, 30, 60, 60, 0.9)]))
                .configure(configure_routes),
        )
        .await;

        let good = png_bytes();
        let names: Vec<String> = (0..11).map(|i| format!("img{i}.png")).collect();
        let parts: Vec<(&str, &str, &[u8])> = names
            .iter()
            .map(|name| ("files", name.as_str(), good.as_slice()))
            .collect();

        let req = multipart_post("/api/batch-predict", &parts);
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), 400);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Maximum 10 files allowed per batch");
    }

    #[actix_web::test]
    async fn batch_without_files_is_a_400() {
        let app = test::init_service(
            App::new()
                .app_data(pipeline_with(vec![]))
                .configure(configure_routes),
        )
        .await;

        let req = multipart_post("/api/batch-predict", &[("file", "a.png", &png_bytes())]);
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), 400);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No files provided");
    }
}
