//! services/api/src/adapters/vision.rs
//!
//! This module contains the adapter for the object-detection model.
//! It implements the `DetectionService` port from the `core` crate by asking an
//! OpenAI vision-capable chat model to locate waste objects in the image.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dumpster_core::{
    annotate::encode_png,
    domain::{BoundingBox, Detection},
    ports::{DetectionService, PortError, PortResult},
};
use image::RgbImage;
use serde::Deserialize;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `DetectionService` using an OpenAI vision model.
#[derive(Clone)]
pub struct OpenAiVisionDetector {
    client: Client<OpenAIConfig>,
    model: String,
    labels: Vec<String>,
}

impl OpenAiVisionDetector {
    /// Creates a new `OpenAiVisionDetector` restricted to the given label vocabulary.
    pub fn new(client: Client<OpenAIConfig>, model: String, labels: Vec<String>) -> Self {
        Self {
            client,
            model,
            labels,
        }
    }

    fn instructions(&self) -> String {
        format!(
            "You are an object detector for waste and garbage. Find every individual waste \
             object in the image. Use only these labels: {}. Respond with ONLY a JSON array, \
             one element per object instance, of the form \
             {{\"label\": \"<label>\", \"box\": [x_min, y_min, x_max, y_max]}} where the box \
             coordinates are fractions of the image width and height between 0 and 1. \
             Respond with [] if there is no waste in the image.",
            self.labels.join(", ")
        )
    }
}

//=========================================================================================
// Model Output Parsing
//=========================================================================================

#[derive(Deserialize)]
struct RawDetection {
    label: String,
    #[serde(default, rename = "box")]
    bbox: Option<[f32; 4]>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResponse {
    List(Vec<RawDetection>),
    Wrapped { detections: Vec<RawDetection> },
}

/// Parses the model's reply, tolerating a Markdown code fence around the JSON.
fn parse_detections(content: &str, labels: &[String]) -> PortResult<Vec<Detection>> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let raw = match serde_json::from_str::<RawResponse>(json) {
        Ok(RawResponse::List(items)) | Ok(RawResponse::Wrapped { detections: items }) => items,
        Err(e) => {
            return Err(PortError::DetectionFailed(format!(
                "model reply was not a detection list: {}",
                e
            )))
        }
    };

    Ok(raw
        .into_iter()
        .filter_map(|d| {
            let label = d.label.trim().to_lowercase();
            if !labels.iter().any(|l| l.eq_ignore_ascii_case(&label)) {
                debug!(label = %label, "dropping detection outside the label vocabulary");
                return None;
            }
            let bbox = d.bbox.map(|[x_min, y_min, x_max, y_max]| BoundingBox {
                x_min,
                y_min,
                x_max,
                y_max,
            });
            Some(Detection { label, bbox })
        })
        .collect())
}

//=========================================================================================
// `DetectionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DetectionService for OpenAiVisionDetector {
    /// Sends the image as a PNG data URL and converts the reply into detections.
    async fn detect(&self, image: &RgbImage) -> PortResult<Vec<Detection>> {
        let png = encode_png(image)?;
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(png));

        let to_port = |e: OpenAIError| PortError::DetectionFailed(e.to_string());

        let parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text("Detect the waste objects in this photo.")
                .build()
                .map_err(to_port)?
                .into(),
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(data_url)
                        .detail(ImageDetail::High)
                        .build()
                        .map_err(to_port)?,
                )
                .build()
                .map_err(to_port)?
                .into(),
        ];

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.instructions())
                .build()
                .map_err(to_port)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(parts)
                .build()
                .map_err(to_port)?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(to_port)?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self.client.chat().create(request).await.map_err(to_port)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::DetectionFailed("detection model returned no content".to_string())
            })?;

        parse_detections(&content, &self.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["plastic".to_string(), "can".to_string()]
    }

    #[test]
    fn parses_plain_array_with_boxes() {
        let parsed = parse_detections(
            r#"[{"label":"plastic","box":[0.1,0.2,0.3,0.4]},{"label":"Can"}]"#,
            &labels(),
        )
        .unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].label, "plastic");
        assert_eq!(
            parsed[0].bbox,
            Some(BoundingBox {
                x_min: 0.1,
                y_min: 0.2,
                x_max: 0.3,
                y_max: 0.4
            })
        );
        assert_eq!(parsed[1].label, "can");
        assert!(parsed[1].bbox.is_none());
    }

    #[test]
    fn parses_fenced_and_wrapped_replies() {
        let parsed = parse_detections(
            "```json\n{\"detections\": [{\"label\": \"can\"}]}\n```",
            &labels(),
        )
        .unwrap();
        assert_eq!(parsed, vec![Detection::labeled("can")]);
    }

    #[test]
    fn drops_unknown_labels() {
        let parsed = parse_detections(r#"[{"label":"dog"},{"label":"plastic"}]"#, &labels()).unwrap();
        assert_eq!(parsed, vec![Detection::labeled("plastic")]);
    }

    #[test]
    fn prose_is_a_detection_failure() {
        assert!(matches!(
            parse_detections("I see some bottles.", &labels()),
            Err(PortError::DetectionFailed(_))
        ));
    }
}
