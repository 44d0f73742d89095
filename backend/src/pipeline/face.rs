use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::RgbImage;
use tch::{CModule, Device, Kind, TchError, Tensor};

/// Margin added around a detected face box before cropping.
pub const CROP_PADDING: u32 = 20;

/// Confidence assigned to cascade detections; the cascade reports raw
/// window scores rather than a calibrated probability.
const CASCADE_CONFIDENCE: f64 = 0.99;

#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("No face detected")]
    NoFace,
    #[error("Face detection failed: {0}")]
    Backend(String),
    #[error("Face detector unavailable")]
    Unavailable,
}

/// Detector output before padding and clamping. Neural detectors may
/// report boxes with negative corners on faces flush against an edge.
#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub confidence: f64,
}

/// A padded face box clamped to the image bounds. Invariant:
/// `x + width <= image_width` and `y + height <= image_height`.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f64,
}

impl Detection {
    pub fn bbox(&self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// The cropped face region together with the detection it came from.
#[derive(Debug)]
pub struct LocatedFace {
    pub crop: RgbImage,
    pub detection: Detection,
    pub num_faces: usize,
}

/// Face detection backend. Implementations must be shareable across
/// worker threads.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<RawDetection>, FaceError>;
}

/// Primary detector: a TorchScript module mapping a `[1, 3, H, W]`
/// float image (values in `[0, 1]`) to an `[N, 5]` tensor of
/// `(x, y, w, h, score)` rows in pixel coordinates.
pub struct TorchDetector {
    module: Mutex<CModule>,
}

impl TorchDetector {
    pub fn load(path: &str) -> Result<Self, TchError> {
        let device = Device::cuda_if_available();
        let module = CModule::load_on_device(path, device)?;
        Ok(Self {
            module: Mutex::new(module),
        })
    }
}

impl FaceDetector for TorchDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<RawDetection>, FaceError> {
        let (width, height) = image.dimensions();
        let plane = (width * height) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (i, px) in image.as_raw().chunks_exact(3).enumerate() {
            data[i] = f32::from(px[0]) / 255.0;
            data[plane + i] = f32::from(px[1]) / 255.0;
            data[2 * plane + i] = f32::from(px[2]) / 255.0;
        }
        let input = Tensor::from_slice(&data).view([1, 3, height as i64, width as i64]);

        // The torch runtime is not proven re-entrant; serialize calls.
        let module = self.module.lock().unwrap();
        let output = module
            .forward_ts(&[input])
            .map_err(|e| FaceError::Backend(e.to_string()))?;
        drop(module);

        let size = output.size();
        if size.len() != 2 || size[1] != 5 {
            return Err(FaceError::Backend(format!(
                "unexpected detector output shape {size:?}"
            )));
        }

        let flat = output.to_kind(Kind::Float).view([-1]);
        let len = flat.size()[0] as usize;
        let mut values = vec![0f32; len];
        flat.copy_data(&mut values, len);

        Ok(values
            .chunks_exact(5)
            .map(|row| RawDetection {
                x: row[0].round() as i32,
                y: row[1].round() as i32,
                width: row[2].round().max(0.0) as u32,
                height: row[3].round().max(0.0) as u32,
                confidence: f64::from(row[4]).clamp(0.0, 1.0),
            })
            .collect())
    }
}

/// Fallback detector: SeetaFace funnel cascade over the grayscale
/// plane. The rustface detector object is stateful, so a fresh one is
/// built per call from a clone of the loaded model.
pub struct CascadeDetector {
    model: rustface::Model,
}

impl CascadeDetector {
    pub fn load(path: &str) -> Result<Self, FaceError> {
        let bytes = std::fs::read(path).map_err(|e| FaceError::Backend(e.to_string()))?;
        let model =
            rustface::read_model(Cursor::new(bytes)).map_err(|e| FaceError::Backend(e.to_string()))?;
        Ok(Self { model })
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<RawDetection>, FaceError> {
        let gray = image::imageops::grayscale(image);
        let (width, height) = gray.dimensions();

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                RawDetection {
                    x: bbox.x(),
                    y: bbox.y(),
                    width: bbox.width(),
                    height: bbox.height(),
                    confidence: CASCADE_CONFIDENCE,
                }
            })
            .collect())
    }
}

/// Finds the most prominent face and computes its padded crop.
pub struct FaceLocator {
    detector: Option<Arc<dyn FaceDetector>>,
    padding: u32,
}

impl FaceLocator {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self {
            detector: Some(detector),
            padding: CROP_PADDING,
        }
    }

    /// Locator with no usable backend; `locate` always fails and the
    /// health endpoint reports the detector as not loaded.
    pub fn unavailable() -> Self {
        Self {
            detector: None,
            padding: CROP_PADDING,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.is_some()
    }

    pub fn locate(&self, image: &RgbImage) -> Result<LocatedFace, FaceError> {
        let detector = self.detector.as_ref().ok_or(FaceError::Unavailable)?;
        let detections = detector.detect(image)?;
        if detections.is_empty() {
            log::warn!("No face detected in image");
            return Err(FaceError::NoFace);
        }

        let num_faces = detections.len();
        let best = select_best(&detections);
        let detection = pad_and_clamp(best, image.width(), image.height(), self.padding);
        if detection.width == 0 || detection.height == 0 {
            return Err(FaceError::Backend(
                "detected face box lies outside the image".to_string(),
            ));
        }

        let crop = image::imageops::crop_imm(
            image,
            detection.x,
            detection.y,
            detection.width,
            detection.height,
        )
        .to_image();

        Ok(LocatedFace {
            crop,
            detection,
            num_faces,
        })
    }
}

/// Highest-confidence detection; ties keep the earliest one.
fn select_best(detections: &[RawDetection]) -> RawDetection {
    let mut best = detections[0];
    for candidate in &detections[1..] {
        if candidate.confidence > best.confidence {
            best = *candidate;
        }
    }
    best
}

/// Grow the box by `padding` on every side, then clamp to the image.
/// The result never extends past an edge, so the crop invariant holds
/// even for faces detected flush against a border.
fn pad_and_clamp(raw: RawDetection, image_width: u32, image_height: u32, padding: u32) -> Detection {
    let pad = i64::from(padding);
    let x = (i64::from(raw.x) - pad).max(0);
    let y = (i64::from(raw.y) - pad).max(0);
    let width = (i64::from(raw.width) + 2 * pad).min(i64::from(image_width) - x);
    let height = (i64::from(raw.height) + 2 * pad).min(i64::from(image_height) - y);

    Detection {
        x: x as u32,
        y: y as u32,
        width: width.max(0) as u32,
        height: height.max(0) as u32,
        confidence: raw.confidence,
    }
}
