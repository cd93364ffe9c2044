use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use atelier_contracts::ImagePayload;

const FILENAME_PROMPT_CHARS: usize = 30;
const DOWNLOAD_EXTENSION: &str = "jpg";

/// Local save affordance for a finished image.
pub trait ImageExporter {
    fn export(&self, payload: &ImagePayload, filename: &str) -> Result<PathBuf>;
}

/// Writes exports into one directory, replacing same-named files.
#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageExporter for FileExporter {
    fn export(&self, payload: &ImagePayload, filename: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(filename);
        fs::write(&path, &payload.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// First 30 characters of the prompt plus the fixed download extension.
///
/// Path separators and control characters become `_` so the name stays a
/// single path component.
pub fn download_filename(prompt: &str) -> String {
    let stem: String = prompt
        .chars()
        .take(FILENAME_PROMPT_CHARS)
        .map(|ch| {
            if ch == '/' || ch == '\\' || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();
    let stem = match stem.trim() {
        "" | "." | ".." => "image",
        trimmed => trimmed,
    };
    format!("{stem}.{DOWNLOAD_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use atelier_contracts::MimeType;

    use super::*;

    #[test]
    fn filename_truncates_prompt_to_thirty_chars() {
        assert_eq!(download_filename("a red fox"), "a red fox.jpg");
        assert_eq!(
            download_filename("a red fox (Edited: make it blue) (Upscaled)"),
            "a red fox (Edited: make it blu.jpg"
        );
    }

    #[test]
    fn filename_counts_characters_not_bytes() {
        let prompt = "é".repeat(40);
        assert_eq!(download_filename(&prompt), format!("{}.jpg", "é".repeat(30)));
    }

    #[test]
    fn filename_is_a_single_component() {
        assert_eq!(download_filename("../etc/passwd"), ".._etc_passwd.jpg");
        assert_eq!(download_filename("line\nbreak"), "line_break.jpg");
        assert_eq!(download_filename("   "), "image.jpg");
        assert_eq!(download_filename(".."), "image.jpg");
    }

    #[test]
    fn file_exporter_writes_and_overwrites() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let exporter = FileExporter::new(temp.path().join("downloads"));
        assert_eq!(exporter.dir(), temp.path().join("downloads"));
        let first = exporter.export(&ImagePayload::new(MimeType::Png, vec![1]), "fox.jpg")?;
        let second = exporter.export(&ImagePayload::new(MimeType::Png, vec![2, 3]), "fox.jpg")?;
        assert_eq!(first, second);
        assert_eq!(fs::read(&second)?, vec![2, 3]);
        Ok(())
    }
}
