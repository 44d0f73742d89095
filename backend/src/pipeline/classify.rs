use std::sync::{Arc, Mutex};

use rand::Rng;
use rand::rngs::StdRng;
use shared::{Label, PredictionResult};
use tch::{CModule, Device, Kind, Tensor};

use super::preprocess::NormalizedTensor;

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("model inference failed: {0}")]
    Model(String),
    #[error("model produced no output")]
    EmptyOutput,
}

/// Classifier model handle, fixed at startup for the process lifetime.
pub enum ModelState {
    Loaded(Arc<Mutex<CModule>>),
    Unavailable,
}

/// Maps a normalized face tensor to a raw score and its interpretation.
///
/// With no model loaded the classifier runs in dummy mode: scores come
/// from the injected RNG so callers still get schema-complete responses
/// (and tests can seed it).
pub struct Classifier {
    state: ModelState,
    rng: Mutex<StdRng>,
}

impl Classifier {
    pub fn new(state: ModelState, rng: StdRng) -> Self {
        Self {
            state,
            rng: Mutex::new(rng),
        }
    }

    /// Load the TorchScript model, falling back to dummy mode when the
    /// artifact is missing or unreadable.
    pub fn load(path: &str, rng: StdRng) -> Self {
        let device = Device::cuda_if_available();
        let state = match CModule::load_on_device(path, device) {
            Ok(module) => {
                log::info!("Model loaded successfully from {path}");
                ModelState::Loaded(Arc::new(Mutex::new(module)))
            }
            Err(e) => {
                log::warn!("Model not loaded from {path} ({e}); using dummy predictions");
                ModelState::Unavailable
            }
        };
        Self::new(state, rng)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ModelState::Loaded(_))
    }

    pub fn classify(&self, tensor: &NormalizedTensor) -> Result<PredictionResult, ClassifyError> {
        let raw_score = match &self.state {
            ModelState::Loaded(module) => self.run_model(module, tensor)?,
            ModelState::Unavailable => {
                log::warn!("Using dummy prediction (model not loaded)");
                self.rng.lock().unwrap().random::<f64>()
            }
        };
        Ok(interpret(raw_score))
    }

    fn run_model(
        &self,
        module: &Arc<Mutex<CModule>>,
        tensor: &NormalizedTensor,
    ) -> Result<f64, ClassifyError> {
        let [n, c, h, w] = tensor.shape();
        let data: Vec<f32> = tensor.view().iter().copied().collect();
        let input = Tensor::from_slice(&data).view([n as i64, c as i64, h as i64, w as i64]);

        // Serialize inference; the runtime is not proven re-entrant.
        let module = module.lock().unwrap();
        let output = module
            .forward_ts(&[input])
            .map_err(|e| ClassifyError::Model(e.to_string()))?;
        drop(module);

        let flat = output.to_kind(Kind::Float).view([-1]);
        let len = flat.size()[0] as usize;
        if len == 0 {
            return Err(ClassifyError::EmptyOutput);
        }
        let mut values = vec![0f32; len];
        flat.copy_data(&mut values, len);
        Ok(f64::from(values[0]).clamp(0.0, 1.0))
    }
}

/// Interpret a raw score in `[0, 1]`. Scores below 0.5 read as Fake;
/// the boundary itself resolves to Real. The two probabilities sum to
/// 100 regardless of the decision threshold.
pub fn interpret(raw_score: f64) -> PredictionResult {
    let (result, confidence) = if raw_score < 0.5 {
        (Label::Fake, (1.0 - raw_score) * 100.0)
    } else {
        (Label::Real, raw_score * 100.0)
    };

    PredictionResult {
        result,
        confidence,
        raw_score,
        fake_probability: (1.0 - raw_score) * 100.0,
        real_probability: raw_score * 100.0,
    }
}
