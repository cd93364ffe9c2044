mod config;
mod dryrun;
mod error;
mod export;
mod gallery;
mod gemini;
mod service;

pub use config::{
    parse_dotenv, AtelierConfig, DEFAULT_API_BASE, DEFAULT_GENERATE_MODEL, DEFAULT_IMAGE_MODEL,
};
pub use dryrun::DryrunImageService;
pub use error::{GalleryError, ServiceError};
pub use export::{download_filename, FileExporter, ImageExporter};
pub use gallery::{
    GallerySnapshot, GalleryStore, ImageSummary, PendingEdit, PendingGenerate, PendingUpscale,
};
pub use gemini::GeminiImageService;
pub use service::{styled_generation_prompt, ImageService, UPSCALE_INSTRUCTION};
