pub mod classify;
pub mod decode;
pub mod encode;
pub mod face;
pub mod preprocess;

use shared::{BatchItemReport, FaceDetectionInfo, PredictionResult};

use crate::config;
pub use classify::{Classifier, ClassifyError, ModelState};
pub use decode::DecodeError;
pub use encode::EncodeError;
pub use face::{FaceError, FaceLocator};

/// Hard cap on items in one batch request.
pub const MAX_BATCH_SIZE: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Face(#[from] FaceError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Whole-batch rejection; raised before any item is processed.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Maximum 10 files allowed per batch")]
    TooManyFiles,
}

/// One raw upload inside a batch request.
#[derive(Debug)]
pub struct BatchInput {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Result of the full single-image path.
#[derive(Debug)]
pub struct PipelineOutput {
    pub prediction: PredictionResult,
    pub face_detection: FaceDetectionInfo,
    pub face_crop: String,
}

/// Sequences decode → locate → preprocess → classify → encode, and
/// drives the bounded batch path with per-item failure isolation.
pub struct Pipeline {
    locator: FaceLocator,
    classifier: Classifier,
}

impl Pipeline {
    pub fn new(locator: FaceLocator, classifier: Classifier) -> Self {
        Self {
            locator,
            classifier,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.classifier.is_loaded()
    }

    pub fn detector_loaded(&self) -> bool {
        self.locator.is_loaded()
    }

    /// Run the full single-image path. Any stage failure short-circuits
    /// the remaining stages.
    pub fn process(&self, bytes: &[u8]) -> Result<PipelineOutput, PipelineError> {
        let image = decode::decode_image(bytes)?;
        let located = self.locator.locate(&image)?;
        log::info!(
            "Face detected with confidence: {:.2}",
            located.detection.confidence
        );

        let tensor = preprocess::prepare(&located.crop);
        let prediction = self.classifier.classify(&tensor)?;
        let face_crop = encode::encode_face_crop(&located.crop)?;

        Ok(PipelineOutput {
            prediction,
            face_detection: FaceDetectionInfo {
                bbox: located.detection.bbox(),
                confidence: located.detection.confidence,
                num_faces: located.num_faces,
            },
            face_crop,
        })
    }

    /// Run every batch item through the single-image path. Items are
    /// independent failure domains: an error on one becomes that item's
    /// entry and the rest still run. The result has exactly one entry
    /// per input, in input order.
    pub fn process_batch(
        &self,
        items: Vec<BatchInput>,
    ) -> Result<Vec<BatchItemReport>, BatchError> {
        if items.len() > MAX_BATCH_SIZE {
            return Err(BatchError::TooManyFiles);
        }

        let results = items
            .into_iter()
            .map(|item| {
                if !config::allowed_file(&item.filename) {
                    return BatchItemReport::Failure {
                        filename: item.filename,
                        error: "Invalid file type".to_string(),
                    };
                }
                match self.process(&item.bytes) {
                    Ok(output) => BatchItemReport::Success {
                        filename: item.filename,
                        prediction: output.prediction,
                        face_detection: output.face_detection,
                    },
                    Err(e) => {
                        log::error!("Batch item {} failed: {e}", item.filename);
                        BatchItemReport::Failure {
                            filename: item.filename,
                            error: e.to_string(),
                        }
                    }
                }
            })
            .collect();

        Ok(results)
    }
}
