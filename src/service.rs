//! Client side of the story backend: ideas, illustrations and narration.

use {
    crate::{
        config::ServiceConfig,
        error::{Result, Service, StoryError},
        types::{Speech, StoryIdea, StoryImage, Timepoint},
    },
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD},
    reqwest::{Client, Response},
    serde::Deserialize,
    serde_json::json,
    std::{sync::Arc, time::Duration},
    tracing::debug,
};

/// The story backend.
#[async_trait]
pub trait StoryService: Send + Sync {
    /// Candidate story ideas. `refresh` asks the backend for fresh ones
    /// instead of whatever it has on hand.
    async fn story_ideas(&self, refresh: bool) -> Result<Vec<StoryIdea>>;

    /// The illustration for `prompt`.
    async fn generate_image(&self, prompt: &str) -> Result<StoryImage>;

    /// The narration of `text`.
    async fn generate_speech(&self, text: &str) -> Result<Speech>;
}

#[derive(Deserialize)]
struct IdeasBody {
    #[serde(default)]
    stories: Vec<Option<StoryIdea>>,
}

#[derive(Deserialize)]
struct ImageBody {
    base64: Option<String>,
    #[serde(default)]
    cached: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechBody {
    audio_content: Option<String>,
    #[serde(default)]
    timepoints: Vec<Timepoint>,
    #[serde(default)]
    cached: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Ideas with a usable prompt, in response order.
pub fn parse_ideas(body: &[u8]) -> Result<Vec<StoryIdea>> {
    let parsed: IdeasBody = serde_json::from_slice(body)?;
    Ok(parsed
        .stories
        .into_iter()
        .flatten()
        .filter(|idea| !idea.prompt.trim().is_empty())
        .collect())
}

pub(crate) fn parse_image(body: &[u8]) -> Result<StoryImage> {
    let parsed: ImageBody = serde_json::from_slice(body)?;
    let encoded = parsed
        .base64
        .filter(|b| !b.is_empty())
        .ok_or_else(|| StoryError::upstream(Service::Image, "response has no image data"))?;

    Ok(StoryImage {
        data: Arc::from(STANDARD.decode(encoded.trim())?),
        cached: parsed.cached,
    })
}

pub(crate) fn parse_speech(body: &[u8]) -> Result<Speech> {
    let parsed: SpeechBody = serde_json::from_slice(body)?;
    let encoded = parsed
        .audio_content
        .filter(|a| !a.is_empty())
        .ok_or_else(|| StoryError::upstream(Service::Speech, "response has no audio"))?;

    Ok(Speech {
        audio: Arc::from(STANDARD.decode(encoded.trim())?),
        timepoints: parsed.timepoints,
        cached: parsed.cached,
    })
}

/// [`StoryService`] over the backend's JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpStoryService {
    client: Client,
    base_url: String,
    language: String,
}

impl HttpStoryService {
    /// A client for the server in `config`.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("storyreel/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    async fn read_body<T>(
        service: Service,
        response: Response,
        parse: fn(&[u8]) -> Result<T>,
    ) -> Result<T> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| status.to_string());
            return Err(StoryError::upstream(service, message));
        }

        parse(&body)
    }
}

#[async_trait]
impl StoryService for HttpStoryService {
    async fn story_ideas(&self, refresh: bool) -> Result<Vec<StoryIdea>> {
        let mut query = vec![("lang", self.language.as_str())];
        if refresh {
            query.push(("refresh", "true"));
        }
        debug!(refresh, "requesting story ideas");

        let response = self
            .client
            .get(self.endpoint("get-story-ideas"))
            .query(&query)
            .send()
            .await?;
        Self::read_body(Service::Ideas, response, parse_ideas).await
    }

    async fn generate_image(&self, prompt: &str) -> Result<StoryImage> {
        let response = self
            .client
            .post(self.endpoint("generate-image"))
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?;
        Self::read_body(Service::Image, response, parse_image).await
    }

    async fn generate_speech(&self, text: &str) -> Result<Speech> {
        let response = self
            .client
            .post(self.endpoint("generate-speech"))
            .json(&json!({ "text": text }))
            .send()
            .await?;
        Self::read_body(Service::Speech, response, parse_speech).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(unused, clippy::missing_panics_doc, clippy::arithmetic_side_effects)]
    use {super::*, assert2::check as assert};

    #[test]
    fn test_ideas_skip_entries_without_prompt() {
        let body = br#"{"stories":[
            {"prompt":"a fox in the snow","story":"The fox played."},
            null,
            {"story":"orphan"},
            {"prompt":"  ","story":"blank"},
            {"prompt":"an owl","story":"The owl slept."}
        ]}"#;
        let ideas = parse_ideas(body).unwrap();
        let prompts: Vec<_> = ideas.iter().map(|i| i.prompt.as_str()).collect();
        assert!(prompts == ["a fox in the snow", "an owl"]);
    }

    #[test]
    fn test_ideas_missing_list_is_empty() {
        assert!(parse_ideas(b"{}").unwrap().is_empty());
    }

    #[test]
    fn test_image_payload_decodes() {
        let image = parse_image(br#"{"base64":"iVBORw==","cached":true}"#).unwrap();
        assert!(&*image.data == b"\x89PNG");
        assert!(image.cached);
    }

    #[test]
    fn test_image_without_data_is_upstream_failure() {
        let err = parse_image(br#"{"cached":false}"#).unwrap_err();
        assert!(matches!(err, StoryError::Upstream { service: Service::Image, .. }));
    }

    #[test]
    fn test_image_with_bad_base64_fails() {
        assert!(matches!(parse_image(br#"{"base64":"!!"}"#), Err(StoryError::Base64(_))));
    }

    #[test]
    fn test_speech_payload_decodes() {
        let speech = parse_speech(
            br#"{"audioContent":"SUQz","timepoints":[{"markName":"0","timeSeconds":0.5}]}"#,
        )
        .unwrap();
        assert!(&*speech.audio == b"ID3");
        assert!(speech.timepoints.len() == 1);
        assert!(!speech.cached);
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let service = HttpStoryService::new(&ServiceConfig {
            base_url: "http://example.test:3000/".into(),
            ..ServiceConfig::default()
        })
        .unwrap();
        assert!(service.endpoint("generate-image") == "http://example.test:3000/api/generate-image");
    }
}
