//! Scripted embedding provider for unit tests.
//!
//! Images are a single row of pixels. Every pixel that is not white is one
//! face, in left-to-right order, with embedding `[r, g, b] / 100`. A magenta
//! pixel makes the provider fail.

use image::{ImageFormat, Rgb, RgbImage};
use rollcall_core::{BoundingBox, Embedding, EmbeddingProvider, EncodeOptions, FaceEncoding, ProviderError};
use std::io::Cursor;

pub(crate) const BACKGROUND: [u8; 3] = [255, 255, 255];
pub(crate) const FAILURE: [u8; 3] = [255, 0, 255];

#[derive(Default)]
pub(crate) struct ScriptedProvider {
    pub calls: Vec<EncodeOptions>,
}

impl EmbeddingProvider for ScriptedProvider {
    fn detect_and_encode(
        &mut self,
        image: &RgbImage,
        options: &EncodeOptions,
    ) -> Result<Vec<FaceEncoding>, ProviderError> {
        self.calls.push(*options);

        let mut faces = Vec::new();
        if image.height() == 0 {
            return Ok(faces);
        }
        for x in 0..image.width() {
            let Rgb(pixel) = *image.get_pixel(x, 0);
            if pixel == FAILURE {
                return Err(ProviderError::Other("scripted provider failure".into()));
            }
            if pixel == BACKGROUND {
                continue;
            }
            faces.push(FaceEncoding {
                region: BoundingBox {
                    x: x as f32,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                    confidence: 1.0,
                    landmarks: None,
                },
                embedding: embedding_of(pixel),
            });
        }
        Ok(faces)
    }
}

pub(crate) fn embedding_of(face: [u8; 3]) -> Embedding {
    Embedding::new(face.iter().map(|&c| c as f32 / 100.0).collect())
}

fn row(faces: &[[u8; 3]]) -> RgbImage {
    if faces.is_empty() {
        return RgbImage::from_pixel(4, 1, Rgb(BACKGROUND));
    }
    RgbImage::from_fn(faces.len() as u32, 1, |x, _| Rgb(faces[x as usize]))
}

fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

/// PNG bytes containing the given faces.
pub(crate) fn png(faces: &[[u8; 3]]) -> Vec<u8> {
    encode(&row(faces), ImageFormat::Png)
}

/// JPEG bytes containing the given faces (pixel values are lossy).
pub(crate) fn jpeg(faces: &[[u8; 3]]) -> Vec<u8> {
    encode(&row(faces), ImageFormat::Jpeg)
}

/// BMP bytes containing the given faces.
pub(crate) fn bmp(faces: &[[u8; 3]]) -> Vec<u8> {
    encode(&row(faces), ImageFormat::Bmp)
}
