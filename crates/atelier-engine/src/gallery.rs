use std::path::PathBuf;

use atelier_contracts::events::{EventWriter, GalleryEvent};
use atelier_contracts::images::{edited_prompt, upscaled_prompt};
use atelier_contracts::{GeneratedImage, ImageId, ImagePayload, ImageStatus, MimeType};
use serde::Serialize;

use crate::error::{error_chain_text, GalleryError, ServiceError};
use crate::export::{download_filename, ImageExporter};
use crate::service::ImageService;

/// A text-to-image call that has been started but not settled.
#[derive(Debug)]
#[must_use = "pass the pending generation to complete_generate"]
pub struct PendingGenerate {
    prompt: String,
}

impl PendingGenerate {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

#[derive(Debug)]
#[must_use = "pass the pending edit to complete_edit"]
pub struct PendingEdit {
    source_id: ImageId,
    source_prompt: String,
    source: ImagePayload,
    instruction: String,
}

impl PendingEdit {
    pub fn source(&self) -> &ImagePayload {
        &self.source
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }
}

#[derive(Debug)]
#[must_use = "pass the pending upscale to complete_upscale"]
pub struct PendingUpscale {
    source_id: ImageId,
    source_prompt: String,
    source: ImagePayload,
}

impl PendingUpscale {
    pub fn source(&self) -> &ImagePayload {
        &self.source
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSummary {
    pub id: ImageId,
    pub prompt: String,
    pub mime_type: MimeType,
    pub bytes: usize,
    pub status: ImageStatus,
}

/// Read-only view the interaction surface renders from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GallerySnapshot {
    pub images: Vec<ImageSummary>,
    pub busy: bool,
    pub processing_id: Option<ImageId>,
    pub last_error: Option<String>,
    pub edit_target: Option<ImageId>,
}

/// In-memory, newest-first gallery plus the transient request state.
///
/// Every remote operation comes in two forms: `request_*` runs the whole
/// round trip, `begin_*`/`complete_*` split it around the remote call so the
/// in-flight state is observable and calls may overlap. Failures never
/// escape; they land in `last_error`.
pub struct GalleryStore {
    images: Vec<GeneratedImage>,
    in_flight: usize,
    /// Sources of unsettled upscales, oldest first.
    upscaling: Vec<ImageId>,
    last_error: Option<String>,
    edit_target: Option<GeneratedImage>,
    events: EventWriter,
}

impl GalleryStore {
    pub fn new(events: EventWriter) -> Self {
        let store = Self {
            images: Vec::new(),
            in_flight: 0,
            upscaling: Vec::new(),
            last_error: None,
            edit_target: None,
            events,
        };
        store.record(GalleryEvent::SessionStarted);
        store
    }

    pub fn images(&self) -> &[GeneratedImage] {
        &self.images
    }

    pub fn get(&self, id: &ImageId) -> Option<&GeneratedImage> {
        self.images.iter().find(|image| &image.id == id)
    }

    pub fn position(&self, id: &ImageId) -> Option<usize> {
        self.images.iter().position(|image| &image.id == id)
    }

    /// True while a generate or edit call is in flight.
    pub fn busy(&self) -> bool {
        self.in_flight > 0
    }

    /// Source of the most recently started upscale that has not settled.
    ///
    /// Stays set until that upscale completes, even if an edit replaced the
    /// source in the meantime.
    pub fn processing_id(&self) -> Option<&ImageId> {
        self.upscaling.last()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn edit_target(&self) -> Option<&GeneratedImage> {
        self.edit_target.as_ref()
    }

    pub fn event_writer(&self) -> &EventWriter {
        &self.events
    }

    pub fn snapshot(&self) -> GallerySnapshot {
        GallerySnapshot {
            images: self
                .images
                .iter()
                .map(|image| ImageSummary {
                    id: image.id.clone(),
                    prompt: image.prompt.clone(),
                    mime_type: image.mime_type(),
                    bytes: image.payload.len(),
                    status: image.status,
                })
                .collect(),
            busy: self.busy(),
            processing_id: self.processing_id().cloned(),
            last_error: self.last_error.clone(),
            edit_target: self.edit_target.as_ref().map(|image| image.id.clone()),
        }
    }

    pub fn request_generate(&mut self, service: &dyn ImageService, prompt: &str) -> Option<ImageId> {
        let pending = self.begin_generate(prompt).ok()?;
        let result = service.generate(pending.prompt());
        self.complete_generate(pending, result)
    }

    pub fn begin_generate(&mut self, prompt: &str) -> Result<PendingGenerate, GalleryError> {
        if prompt.trim().is_empty() {
            return Err(self.reject(GalleryError::EmptyPrompt));
        }
        self.in_flight += 1;
        self.last_error = None;
        self.record(GalleryEvent::GenerationStarted {
            prompt: prompt.to_string(),
        });
        Ok(PendingGenerate {
            prompt: prompt.to_string(),
        })
    }

    pub fn complete_generate(
        &mut self,
        pending: PendingGenerate,
        result: Result<ImagePayload, ServiceError>,
    ) -> Option<ImageId> {
        self.in_flight = self.in_flight.saturating_sub(1);
        match result {
            Ok(payload) => {
                let image = GeneratedImage::new(ImageId::generated(), payload, pending.prompt);
                let id = image.id.clone();
                self.record(GalleryEvent::ImageCreated {
                    image_id: id.clone(),
                    prompt: image.prompt.clone(),
                    mime_type: image.mime_type(),
                    bytes: image.payload.len(),
                });
                self.images.insert(0, image);
                Some(id)
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                self.record(GalleryEvent::GenerationFailed {
                    prompt: pending.prompt,
                    error: err.to_string(),
                    detail: err.detail().to_string(),
                });
                None
            }
        }
    }

    pub fn request_edit(
        &mut self,
        service: &dyn ImageService,
        original: &GeneratedImage,
        instruction: &str,
    ) -> Option<ImageId> {
        let pending = self.begin_edit(original, instruction).ok()?;
        let result = service.edit(pending.source(), pending.instruction());
        self.complete_edit(pending, result)
    }

    /// Starts an edit. The edit target is closed as soon as the edit starts,
    /// whatever the outcome; an empty instruction leaves it open.
    ///
    /// An image that is being upscaled keeps its `Upscaling` marker.
    pub fn begin_edit(
        &mut self,
        original: &GeneratedImage,
        instruction: &str,
    ) -> Result<PendingEdit, GalleryError> {
        if instruction.trim().is_empty() {
            return Err(self.reject(GalleryError::EmptyInstruction));
        }
        self.in_flight += 1;
        self.last_error = None;
        self.edit_target = None;
        self.transition(&original.id, ImageStatus::Idle, ImageStatus::Editing);
        self.record(GalleryEvent::EditStarted {
            image_id: original.id.clone(),
            instruction: instruction.to_string(),
            mime_type: original.mime_type(),
        });
        Ok(PendingEdit {
            source_id: original.id.clone(),
            source_prompt: original.prompt.clone(),
            source: original.payload.clone(),
            instruction: instruction.to_string(),
        })
    }

    pub fn complete_edit(
        &mut self,
        pending: PendingEdit,
        result: Result<ImagePayload, ServiceError>,
    ) -> Option<ImageId> {
        self.in_flight = self.in_flight.saturating_sub(1);
        match result {
            Ok(payload) => {
                let image = GeneratedImage::new(
                    ImageId::edited(),
                    payload,
                    edited_prompt(&pending.source_prompt, &pending.instruction),
                );
                self.replace_by_id(&pending.source_id, image)
            }
            Err(err) => {
                self.transition(&pending.source_id, ImageStatus::Editing, ImageStatus::Idle);
                self.last_error = Some(err.to_string());
                self.record(GalleryEvent::EditFailed {
                    image_id: pending.source_id,
                    error: err.to_string(),
                    detail: err.detail().to_string(),
                });
                None
            }
        }
    }

    pub fn request_upscale(
        &mut self,
        service: &dyn ImageService,
        image: &GeneratedImage,
    ) -> Option<ImageId> {
        let pending = self.begin_upscale(image);
        let result = service.upscale(pending.source());
        self.complete_upscale(pending, result)
    }

    pub fn begin_upscale(&mut self, image: &GeneratedImage) -> PendingUpscale {
        self.last_error = None;
        self.upscaling.push(image.id.clone());
        self.set_status(&image.id, ImageStatus::Upscaling);
        self.record(GalleryEvent::UpscaleStarted {
            image_id: image.id.clone(),
            mime_type: image.mime_type(),
        });
        PendingUpscale {
            source_id: image.id.clone(),
            source_prompt: image.prompt.clone(),
            source: image.payload.clone(),
        }
    }

    /// Settles an upscale. Its source leaves `processing_id` and loses the
    /// `Upscaling` marker on both the success and the failure path.
    pub fn complete_upscale(
        &mut self,
        pending: PendingUpscale,
        result: Result<ImagePayload, ServiceError>,
    ) -> Option<ImageId> {
        if let Some(idx) = self.upscaling.iter().rposition(|id| id == &pending.source_id) {
            self.upscaling.remove(idx);
        }
        if !self.upscaling.contains(&pending.source_id) {
            self.transition(&pending.source_id, ImageStatus::Upscaling, ImageStatus::Idle);
        }
        match result {
            Ok(payload) => {
                let image = GeneratedImage::new(
                    ImageId::upscaled(),
                    payload,
                    upscaled_prompt(&pending.source_prompt),
                );
                self.replace_by_id(&pending.source_id, image)
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                self.record(GalleryEvent::UpscaleFailed {
                    image_id: pending.source_id,
                    error: err.to_string(),
                    detail: err.detail().to_string(),
                });
                None
            }
        }
    }

    pub fn select_for_edit(&mut self, image: &GeneratedImage) {
        self.record(GalleryEvent::EditTargetSelected {
            image_id: image.id.clone(),
        });
        self.edit_target = Some(image.clone());
    }

    pub fn clear_edit_target(&mut self) {
        if let Some(previous) = self.edit_target.take() {
            self.record(GalleryEvent::EditTargetCleared {
                image_id: previous.id,
            });
        }
    }

    /// Prepends an image that did not come from the remote service.
    pub fn adopt(&mut self, payload: ImagePayload, prompt: impl Into<String>) -> ImageId {
        let image = GeneratedImage::new(ImageId::generated(), payload, prompt);
        let id = image.id.clone();
        self.record(GalleryEvent::ImageOpened {
            image_id: id.clone(),
            prompt: image.prompt.clone(),
            mime_type: image.mime_type(),
        });
        self.images.insert(0, image);
        id
    }

    /// Best-effort export. Never touches gallery state; failures are only logged.
    pub fn download(&self, image: &GeneratedImage, exporter: &dyn ImageExporter) -> Option<PathBuf> {
        let filename = download_filename(&image.prompt);
        match exporter.export(&image.payload, &filename) {
            Ok(path) => {
                self.record(GalleryEvent::ImageDownloaded {
                    image_id: image.id.clone(),
                    filename,
                    path: path.clone(),
                });
                Some(path)
            }
            Err(err) => {
                self.record(GalleryEvent::DownloadFailed {
                    image_id: image.id.clone(),
                    filename,
                    detail: error_chain_text(&err, 1024),
                });
                None
            }
        }
    }

    /// Replaces the entry with `id` in place. Absent ids drop the new image.
    fn replace_by_id(&mut self, id: &ImageId, image: GeneratedImage) -> Option<ImageId> {
        let new_id = image.id.clone();
        let Some(position) = self.position(id) else {
            self.record(GalleryEvent::ReplacementDropped {
                source_id: id.clone(),
                dropped_id: new_id,
            });
            return None;
        };
        self.record(GalleryEvent::ImageReplaced {
            source_id: id.clone(),
            image_id: new_id.clone(),
            position,
            prompt: image.prompt.clone(),
            mime_type: image.mime_type(),
        });
        self.images[position] = image;
        Some(new_id)
    }

    fn set_status(&mut self, id: &ImageId, status: ImageStatus) {
        if let Some(image) = self.images.iter_mut().find(|image| &image.id == id) {
            image.status = status;
        }
    }

    fn transition(&mut self, id: &ImageId, from: ImageStatus, to: ImageStatus) {
        if let Some(image) = self
            .images
            .iter_mut()
            .find(|image| &image.id == id && image.status == from)
        {
            image.status = to;
        }
    }

    fn reject(&mut self, err: GalleryError) -> GalleryError {
        self.last_error = Some(err.to_string());
        self.record(GalleryEvent::ValidationFailed {
            error: err.to_string(),
        });
        err
    }

    fn record(&self, event: GalleryEvent) {
        if let Err(err) = self.events.emit(&event) {
            eprintln!("atelier: failed to write event log: {err:#}");
        }
    }
}
