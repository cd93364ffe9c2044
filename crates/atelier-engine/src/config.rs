use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{bail, Result};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GENERATE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

const API_KEY_VARS: &[&str] = &["API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtelierConfig {
    pub api_key: String,
    pub api_base: String,
    pub generate_model: String,
    pub image_model: String,
}

impl AtelierConfig {
    /// Process environment first, then `.env` in the working directory.
    pub fn from_env() -> Result<Self> {
        let dotenv = parse_dotenv(Path::new(".env"));
        Self::resolve(|key| non_empty_env(key).or_else(|| non_empty(dotenv.get(key))))
    }

    /// A missing API key is fatal; everything else has a default.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let Some(api_key) = API_KEY_VARS.iter().find_map(|key| lookup(*key)) else {
            bail!("API_KEY or GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        Ok(Self {
            api_key,
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            generate_model: lookup("ATELIER_GENERATE_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATE_MODEL.to_string()),
            image_model: lookup("ATELIER_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    non_empty(env::var(key).ok().as_ref())
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Reads `KEY=value` lines. A missing or unreadable file yields no entries.
pub fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let Ok(content) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    content.lines().filter_map(parse_dotenv_line).collect()
}

/// Accepts `KEY=value` and `export KEY=value`; skips blanks and `#` comments.
fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value)
}
