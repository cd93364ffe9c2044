use std::time::Duration;

use anyhow::{bail, Context, Result};
use atelier_contracts::{ImagePayload, MimeType};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use crate::config::AtelierConfig;
use crate::error::{error_chain_text, truncate_text, ServiceError};
use crate::service::{styled_generation_prompt, ImageService, UPSCALE_INSTRUCTION};

const ERROR_DETAIL_MAX_CHARS: usize = 2048;
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Generative Language backend.
///
/// Text-to-image goes to the Imagen `:predict` endpoint; edit and upscale go
/// to a Gemini image model's `:generateContent` with the source inlined.
pub struct GeminiImageService {
    api_base: String,
    api_key: String,
    generate_model: String,
    image_model: String,
    http: HttpClient,
}

impl GeminiImageService {
    pub fn new(config: &AtelierConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            generate_model: config.generate_model.clone(),
            image_model: config.image_model.clone(),
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    fn build_generate_payload(prompt: &str) -> Value {
        json!({
            "instances": [{
                "prompt": styled_generation_prompt(prompt),
            }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": "1:1",
                "outputOptions": {
                    "mimeType": MimeType::Jpeg.as_str(),
                },
            },
        })
    }

    fn build_image_instruction_payload(source: &ImagePayload, text: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": source.mime_type.as_str(),
                            "data": source.base64(),
                        }
                    },
                    { "text": text },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
            },
        })
    }

    fn post_json(&self, label: &str, endpoint: &str, payload: &Value) -> Result<Value> {
        let response = self
            .http
            .post(endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(payload)
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{label} request failed ({endpoint})"))?;
        response_json_or_error(label, response)
    }

    fn extract_predictions(response_payload: &Value) -> Result<Vec<ImagePayload>> {
        let predictions = response_payload
            .get("predictions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::new();
        for row in predictions {
            let Some(obj) = row.as_object() else {
                continue;
            };
            let image = obj
                .get("image")
                .and_then(Value::as_object)
                .unwrap_or(obj);
            let Some(encoded) = obj
                .get("bytesBase64Encoded")
                .or_else(|| image.get("imageBytes"))
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
            else {
                continue;
            };
            let bytes = BASE64
                .decode(encoded.as_bytes())
                .context("Imagen image base64 decode failed")?;
            let mime_type = obj
                .get("mimeType")
                .or_else(|| image.get("mimeType"))
                .and_then(Value::as_str)
                .map(MimeType::from_mime)
                .unwrap_or(MimeType::Jpeg);
            out.push(ImagePayload::new(mime_type, bytes));
        }
        Ok(out)
    }

    /// First inline image of the first candidate, if any.
    fn first_inline_image(response_payload: &Value) -> Result<Option<ImagePayload>> {
        let parts = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let bytes = BASE64
                .decode(data.as_bytes())
                .context("Gemini image base64 decode failed")?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .map(MimeType::from_mime)
                .unwrap_or(MimeType::Png);
            return Ok(Some(ImagePayload::new(mime_type, bytes)));
        }
        Ok(None)
    }

    fn try_generate(&self, prompt: &str) -> Result<ImagePayload> {
        let endpoint = self.endpoint_for_model(&self.generate_model, "predict");
        let response = self.post_json("Imagen", &endpoint, &Self::build_generate_payload(prompt))?;
        let Some(image) = Self::extract_predictions(&response)?.into_iter().next() else {
            bail!("No image was generated.");
        };
        Ok(image)
    }

    fn try_image_instruction(&self, source: &ImagePayload, text: &str, missing: &str) -> Result<ImagePayload> {
        let endpoint = self.endpoint_for_model(&self.image_model, "generateContent");
        let payload = Self::build_image_instruction_payload(source, text);
        let response = self.post_json("Gemini", &endpoint, &payload)?;
        match Self::first_inline_image(&response)? {
            Some(image) => Ok(image),
            None => bail!("{missing}"),
        }
    }
}

impl ImageService for GeminiImageService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, prompt: &str) -> Result<ImagePayload, ServiceError> {
        self.try_generate(prompt)
            .map_err(|err| ServiceError::GenerationFailed {
                detail: error_chain_text(&err, ERROR_DETAIL_MAX_CHARS),
            })
    }

    fn edit(&self, source: &ImagePayload, instruction: &str) -> Result<ImagePayload, ServiceError> {
        self.try_image_instruction(source, instruction, "No edited image was returned.")
            .map_err(|err| ServiceError::EditFailed {
                detail: error_chain_text(&err, ERROR_DETAIL_MAX_CHARS),
            })
    }

    fn upscale(&self, source: &ImagePayload) -> Result<ImagePayload, ServiceError> {
        self.try_image_instruction(source, UPSCALE_INSTRUCTION, "No upscaled image was returned.")
            .map_err(|err| ServiceError::UpscaleFailed {
                detail: error_chain_text(&err, ERROR_DETAIL_MAX_CHARS),
            })
    }
}

fn response_json_or_error(label: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{label} response body read failed"))?;
    if !status.is_success() {
        bail!("{label} request failed ({code}): {}", truncate_text(&body, 512));
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{label} returned invalid JSON payload"))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config_for_test(api_base: &str) -> AtelierConfig {
        AtelierConfig {
            api_key: "secret-test-key".to_string(),
            api_base: api_base.to_string(),
            generate_model: "imagen-4.0-generate-001".to_string(),
            image_model: "models/gemini-2.5-flash-image".to_string(),
        }
    }

    #[test]
    fn endpoints_accept_bare_and_prefixed_model_names() -> anyhow::Result<()> {
        let service = GeminiImageService::new(&config_for_test("https://example.test/v1beta/"))?;
        assert_eq!(
            service.endpoint_for_model(&service.generate_model, "predict"),
            "https://example.test/v1beta/models/imagen-4.0-generate-001:predict"
        );
        assert_eq!(
            service.endpoint_for_model(&service.image_model, "generateContent"),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        Ok(())
    }

    #[test]
    fn generate_payload_fixes_count_ratio_and_jpeg() {
        let payload = GeminiImageService::build_generate_payload("a red fox");
        let prompt = payload["instances"][0]["prompt"].as_str().unwrap_or_default();
        assert!(prompt.contains("photorealistic image of: a red fox."));
        assert_eq!(payload["parameters"]["sampleCount"], json!(1));
        assert_eq!(payload["parameters"]["aspectRatio"], json!("1:1"));
        assert_eq!(
            payload["parameters"]["outputOptions"]["mimeType"],
            json!("image/jpeg")
        );
    }

    #[test]
    fn instruction_payload_inlines_source_with_its_mime() {
        let source = ImagePayload::new(MimeType::Jpeg, b"abc".to_vec());
        let payload = GeminiImageService::build_image_instruction_payload(&source, "make it blue");
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("YWJj"));
        assert_eq!(parts[1]["text"], json!("make it blue"));
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE"])
        );
    }

    #[test]
    fn predictions_accept_both_response_shapes() -> anyhow::Result<()> {
        let payload = json!({
            "predictions": [
                {"bytesBase64Encoded": BASE64.encode(b"one"), "mimeType": "image/jpeg"},
                {"image": {"imageBytes": BASE64.encode(b"two")}},
                {"raiFilteredReason": "filtered"},
            ]
        });
        let images = GeminiImageService::extract_predictions(&payload)?;
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].bytes, b"one");
        assert_eq!(images[1].bytes, b"two");
        assert!(images.iter().all(|image| image.mime_type == MimeType::Jpeg));
        Ok(())
    }

    #[test]
    fn predictions_empty_when_nothing_generated() -> anyhow::Result<()> {
        assert!(GeminiImageService::extract_predictions(&json!({}))?.is_empty());
        Ok(())
    }

    #[test]
    fn first_inline_image_skips_text_parts() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "here you go"},
                    {"inlineData": {"mimeType": "image/png", "data": BASE64.encode(b"png")}},
                    {"inlineData": {"mimeType": "image/png", "data": BASE64.encode(b"second")}},
                ]}
            }]
        });
        let image = GeminiImageService::first_inline_image(&payload)?;
        assert_eq!(image, Some(ImagePayload::new(MimeType::Png, b"png".to_vec())));
        Ok(())
    }

    #[test]
    fn first_inline_image_defaults_to_png_and_handles_missing() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"inline_data": {"data": BASE64.encode(b"x")}}]}}]
        });
        let image = GeminiImageService::first_inline_image(&payload)?;
        assert_eq!(image.map(|image| image.mime_type), Some(MimeType::Png));

        let text_only = json!({"candidates": [{"content": {"parts": [{"text": "sorry"}]}}]});
        assert!(GeminiImageService::first_inline_image(&text_only)?.is_none());
        assert!(GeminiImageService::first_inline_image(&json!({"candidates": []}))?.is_none());
        Ok(())
    }

    #[test]
    fn transport_failure_becomes_typed_error() -> anyhow::Result<()> {
        // Nothing listens on port 9 of the loopback interface.
        let service = GeminiImageService::new(&config_for_test("http://127.0.0.1:9/v1beta"))?;
        let err = service
            .upscale(&ImagePayload::new(MimeType::Png, vec![1, 2, 3]))
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected upscale to fail"))?;
        assert!(matches!(err, ServiceError::UpscaleFailed { .. }));
        assert!(err.detail().contains("Gemini request failed"));
        assert!(!err.to_string().contains("127.0.0.1"));
        Ok(())
    }

    #[test]
    fn api_key_never_reaches_failure_detail() -> anyhow::Result<()> {
        let service = GeminiImageService::new(&config_for_test("http://127.0.0.1:9/v1beta"))?;
        let source = ImagePayload::new(MimeType::Png, vec![1, 2, 3]);
        let failures = [
            service.generate("fox").err(),
            service.edit(&source, "make it blue").err(),
            service.upscale(&source).err(),
        ];
        for err in failures {
            let err = err.ok_or_else(|| anyhow::anyhow!("expected a transport failure"))?;
            assert!(!err.detail().is_empty());
            assert!(
                !err.detail().contains("secret-test-key"),
                "detail leaked the key: {}",
                err.detail()
            );
            assert!(!err.detail().contains("key="));
        }
        Ok(())
    }
}
