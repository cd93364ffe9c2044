use std::io::Cursor;

use anyhow::{Context, Result};
use atelier_contracts::{ImagePayload, MimeType};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::error::{error_chain_text, ServiceError};
use crate::service::{styled_generation_prompt, ImageService};

const DEFAULT_DRYRUN_SIZE: u32 = 256;
const DEFAULT_MAX_EDGE: u32 = 2048;

/// Local stub for demos and tests; it never contacts a model.
///
/// Images are solid colours derived from the prompt (or instruction and
/// source bytes), so identical inputs give identical images. Upscaling
/// doubles each edge up to `max_edge`.
#[derive(Debug, Clone)]
pub struct DryrunImageService {
    size: u32,
    max_edge: u32,
}

impl Default for DryrunImageService {
    fn default() -> Self {
        Self::new(DEFAULT_DRYRUN_SIZE)
    }
}

impl DryrunImageService {
    pub fn new(size: u32) -> Self {
        let size = size.max(1);
        Self {
            size,
            max_edge: DEFAULT_MAX_EDGE.max(size),
        }
    }

    pub fn with_max_edge(mut self, max_edge: u32) -> Self {
        self.max_edge = max_edge.max(1);
        self
    }

    fn try_edit(source: &ImagePayload, instruction: &str) -> Result<ImagePayload> {
        let decoded = decode(source)?;
        let (r, g, b) = color_from_seed(&[&source.bytes, instruction.as_bytes()]);
        let image = solid_image(decoded.width(), decoded.height(), (r, g, b));
        encode(&DynamicImage::ImageRgb8(image), ImageFormat::Png)
    }

    fn try_upscale(&self, source: &ImagePayload) -> Result<ImagePayload> {
        let decoded = decode(source)?;
        let width = self.upscaled_edge(decoded.width());
        let height = self.upscaled_edge(decoded.height());
        if (width, height) == (decoded.width(), decoded.height()) {
            return encode(&decoded, ImageFormat::Png);
        }
        let upscaled = decoded.resize_exact(width, height, FilterType::Lanczos3);
        encode(&upscaled, ImageFormat::Png)
    }

    fn upscaled_edge(&self, edge: u32) -> u32 {
        edge.saturating_mul(2).min(self.max_edge.max(edge))
    }
}

impl ImageService for DryrunImageService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, prompt: &str) -> Result<ImagePayload, ServiceError> {
        let styled = styled_generation_prompt(prompt);
        let image = solid_image(self.size, self.size, color_from_seed(&[styled.as_bytes()]));
        encode(&DynamicImage::ImageRgb8(image), ImageFormat::Jpeg).map_err(|err| {
            ServiceError::GenerationFailed {
                detail: error_chain_text(&err, 512),
            }
        })
    }

    fn edit(&self, source: &ImagePayload, instruction: &str) -> Result<ImagePayload, ServiceError> {
        Self::try_edit(source, instruction).map_err(|err| ServiceError::EditFailed {
            detail: error_chain_text(&err, 512),
        })
    }

    fn upscale(&self, source: &ImagePayload) -> Result<ImagePayload, ServiceError> {
        self.try_upscale(source).map_err(|err| ServiceError::UpscaleFailed {
            detail: error_chain_text(&err, 512),
        })
    }
}

fn decode(source: &ImagePayload) -> Result<DynamicImage> {
    image::load_from_memory(&source.bytes)
        .with_context(|| format!("dryrun could not decode {} source", source.mime_type))
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<ImagePayload> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, format)
        .with_context(|| format!("dryrun failed to encode {format:?}"))?;
    let mime_type = if format == ImageFormat::Jpeg {
        MimeType::Jpeg
    } else {
        MimeType::Png
    };
    Ok(ImagePayload::new(mime_type, out.into_inner()))
}

fn solid_image(width: u32, height: u32, (r, g, b): (u8, u8, u8)) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([r, g, b]))
}

fn color_from_seed(parts: &[&[u8]]) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
