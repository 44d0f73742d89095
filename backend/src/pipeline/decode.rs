use image::RgbImage;

/// Raw bytes were not a decodable image.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode image: {0}")]
pub struct DecodeError(#[from] image::ImageError);

/// Decode raw upload bytes into an RGB pixel buffer.
///
/// Grayscale inputs are expanded to three channels and an alpha channel
/// is stripped; any other color layout is converted to RGB. No resizing
/// happens here.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}
