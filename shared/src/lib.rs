use serde::{Deserialize, Serialize};

/// Verdict of the binary classifier.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Label {
    Real,
    Fake,
}

/// Interpreted classifier output. `fake_probability` and
/// `real_probability` always sum to 100.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PredictionResult {
    pub result: Label,
    pub confidence: f64,
    pub raw_score: f64,
    pub fake_probability: f64,
    pub real_probability: f64,
}

/// Detection summary for the face the pipeline kept.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FaceDetectionInfo {
    #[serde(rename = "box")]
    pub bbox: [u32; 4],
    pub confidence: f64,
    pub num_faces: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PredictResponse {
    pub success: bool,
    pub prediction: PredictionResult,
    pub face_detection: FaceDetectionInfo,
    pub face_crop: String,
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub face_detector_loaded: bool,
    pub timestamp: String,
}

/// One entry per submitted batch item, in input order.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum BatchItemReport {
    Success {
        filename: String,
        prediction: PredictionResult,
        face_detection: FaceDetectionInfo,
    },
    Failure {
        filename: String,
        error: String,
    },
}

impl BatchItemReport {
    pub fn filename(&self) -> &str {
        match self {
            BatchItemReport::Success { filename, .. } => filename,
            BatchItemReport::Failure { filename, .. } => filename,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BatchResponse {
    pub success: bool,
    pub total_files: usize,
    pub results: Vec<BatchItemReport>,
    pub timestamp: String,
}
