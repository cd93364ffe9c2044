use atelier_contracts::ImagePayload;

use crate::error::ServiceError;

/// Wraps the user prompt before text-to-image submission.
pub fn styled_generation_prompt(prompt: &str) -> String {
    format!(
        "An ultra-realistic, photorealistic image of: {prompt}. Cinematic lighting, 8k resolution, professional photography."
    )
}

pub const UPSCALE_INSTRUCTION: &str = "Upscale this image, significantly increasing its resolution and enhancing fine details. Maintain photorealism and clarity. Do not add, remove, or change any objects or subjects in the image.";

/// Remote image backend: one request/response round trip per call.
///
/// Implementations never return raw transport errors; every failure is
/// normalised into the `ServiceError` variant of the operation.
pub trait ImageService {
    fn name(&self) -> &str;

    /// Text-to-image. Returns a JPEG.
    fn generate(&self, prompt: &str) -> Result<ImagePayload, ServiceError>;

    /// Image-conditioned edit. Returns a PNG unless the backend reports otherwise.
    fn edit(&self, source: &ImagePayload, instruction: &str) -> Result<ImagePayload, ServiceError>;

    fn upscale(&self, source: &ImagePayload) -> Result<ImagePayload, ServiceError>;
}
