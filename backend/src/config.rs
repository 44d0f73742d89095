use std::env;
use std::path::Path;

/// Hard cap on a single uploaded file.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Extensions accepted for upload, checked by filename suffix only.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Startup configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: String,
    pub model_path: String,
    pub detector_path: String,
    pub cascade_model_path: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT").unwrap_or_else(|_| "5000".to_string()),
            model_path: env::var("MODEL_PATH")
                .unwrap_or_else(|_| "model/deepfake_detector.pt".to_string()),
            detector_path: env::var("FACE_DETECTOR_PATH")
                .unwrap_or_else(|_| "model/face_detector.pt".to_string()),
            cascade_model_path: env::var("CASCADE_MODEL_PATH")
                .unwrap_or_else(|_| "model/seeta_fd_frontal_v1.0.bin".to_string()),
        }
    }
}

/// Check if a filename carries an allowed image extension.
pub fn allowed_file(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
