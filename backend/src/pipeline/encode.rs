use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use image::RgbImage;
use shared::PredictResponse;

use super::PipelineOutput;

#[derive(Debug, thiserror::Error)]
#[error("failed to encode face crop: {0}")]
pub struct EncodeError(#[from] image::ImageError);

/// Encode a face crop as a self-describing JPEG data URI for transport.
pub fn encode_face_crop(crop: &RgbImage) -> Result<String, EncodeError> {
    let mut bytes = Vec::new();
    crop.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        STANDARD.encode(&bytes)
    ))
}

/// Assemble the single-image response envelope.
pub fn build_response(output: PipelineOutput) -> PredictResponse {
    PredictResponse {
        success: true,
        prediction: output.prediction,
        face_detection: output.face_detection,
        face_crop: output.face_crop,
        timestamp: Utc::now().to_rfc3339(),
    }
}
