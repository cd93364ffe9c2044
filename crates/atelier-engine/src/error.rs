use thiserror::Error;

/// Typed failure of one remote image operation.
///
/// `Display` is the fixed user-facing message. The remote diagnostic text is
/// kept in `detail` for the event log and never shown to the user.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to generate image. Please check your prompt or API key.")]
    GenerationFailed { detail: String },

    #[error("Failed to edit image. The model may not have been able to fulfill the request.")]
    EditFailed { detail: String },

    #[error("Failed to upscale image. The model may not have been able to fulfill the request.")]
    UpscaleFailed { detail: String },
}

impl ServiceError {
    pub fn detail(&self) -> &str {
        match self {
            Self::GenerationFailed { detail }
            | Self::EditFailed { detail }
            | Self::UpscaleFailed { detail } => detail,
        }
    }
}

/// Input rejected by the gallery before any remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GalleryError {
    #[error("Please enter a prompt.")]
    EmptyPrompt,

    #[error("Please enter an editing prompt.")]
    EmptyInstruction,
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing: &String| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
