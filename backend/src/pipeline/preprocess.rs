use image::RgbImage;
use image::imageops::FilterType;
use ndarray::{Array4, ArrayView4};

/// Square edge length the classifier expects.
pub const IMG_SIZE: u32 = 224;

/// Classifier input: NCHW float tensor with a batch dimension of 1 and
/// values in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct NormalizedTensor {
    data: Array4<f32>,
}

impl NormalizedTensor {
    pub fn shape(&self) -> [usize; 4] {
        let shape = self.data.shape();
        [shape[0], shape[1], shape[2], shape[3]]
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }
}

/// Resize a face crop to the fixed square input and normalize to
/// `[0, 1]`. Deterministic and total over any non-empty crop.
pub fn prepare(crop: &RgbImage) -> NormalizedTensor {
    let resized = image::imageops::resize(crop, IMG_SIZE, IMG_SIZE, FilterType::Triangle);

    let side = IMG_SIZE as usize;
    let mut data = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            data[[0, channel, y as usize, x as usize]] = f32::from(pixel[channel]) / 255.0;
        }
    }

    NormalizedTensor { data }
}
