use base64::{engine::general_purpose, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;

use crate::core::errors::{InputError, InputResult, PipelineError, PipelineResult};

/// JPEG quality for annotated images returned to clients
const ANNOTATED_JPEG_QUALITY: u8 = 90;

/// Decode a base64 image payload, with or without a `data:image/...;base64,`
/// prefix
pub fn decode_base64_image(payload: &str) -> InputResult<Vec<u8>> {
    let payload = payload.trim();
    let encoded = match payload.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => payload,
    };
    if encoded.is_empty() {
        return Err(InputError::MissingImage);
    }

    // Clients sometimes wrap long payloads
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(general_purpose::STANDARD.decode(compact)?)
}

/// Decode image bytes of any supported format
pub fn load_image_from_memory(bytes: &[u8]) -> InputResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(InputError::MissingImage);
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Decode image bytes on the blocking pool.
///
/// Image decoding is CPU-intensive, especially for large scans.
pub async fn load_image_from_memory_async(bytes: Vec<u8>) -> PipelineResult<DynamicImage> {
    tokio::task::spawn_blocking(move || load_image_from_memory(&bytes))
        .await
        .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))?
        .map_err(PipelineError::from)
}

/// Encode as JPEG; alpha and 16-bit/float layouts are flattened to RGB8
pub fn encode_jpeg(img: &DynamicImage) -> PipelineResult<Vec<u8>> {
    let rgb = match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img.clone(),
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageLuma8(img.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    };

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut bytes), ANNOTATED_JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(PipelineError::EncodingFailed)?;
    Ok(bytes)
}

/// JPEG-encode and base64 the annotated image on the blocking pool
pub async fn encode_jpeg_base64_async(img: DynamicImage) -> PipelineResult<String> {
    tokio::task::spawn_blocking(move || {
        let jpeg = encode_jpeg(&img)?;
        Ok(general_purpose::STANDARD.encode(jpeg))
    })
    .await
    .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgba, RgbaImage};

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn test_decode_plain_and_data_url() {
        let raw = b"not really an image";
        let encoded = general_purpose::STANDARD.encode(raw);

        assert_eq!(decode_base64_image(&encoded).unwrap(), raw);
        let data_url = format!("data:image/png;base64,{}", encoded);
        assert_eq!(decode_base64_image(&data_url).unwrap(), raw);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_base64_image("***"),
            Err(InputError::InvalidBase64(_))
        ));
        assert!(matches!(
            decode_base64_image("data:image/png;base64,"),
            Err(InputError::MissingImage)
        ));
    }

    #[test]
    fn test_load_rejects_non_image_bytes() {
        assert!(matches!(
            load_image_from_memory(b"hello"),
            Err(InputError::Undecodable(_))
        ));
        assert!(matches!(load_image_from_memory(&[]), Err(InputError::MissingImage)));
    }

    #[tokio::test]
    async fn test_async_load_round_trip() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(12, 8, Luma([200])));
        let loaded = load_image_from_memory_async(png_bytes(&img)).await.unwrap();
        assert_eq!((loaded.width(), loaded.height()), (12, 8));
    }

    #[tokio::test]
    async fn test_jpeg_base64_handles_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([10, 20, 30, 128])));
        let encoded = encode_jpeg_base64_async(img).await.unwrap();

        let jpeg = general_purpose::STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.width(), 10);
    }
}
