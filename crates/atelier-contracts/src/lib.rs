pub mod chat;
pub mod events;
pub mod images;

pub use events::{EventWriter, GalleryEvent};
pub use images::{GeneratedImage, ImageId, ImagePayload, ImageStatus, MimeType};
