use super::prompts;
use super::schema::{classification_schema, response_schema, TaskOutput};
use super::{Capability, ExtractionInput, ExtractionService};
use crate::config::{Config, ExtractionConfig, ExtractionProvider};
use crate::error::{Error, Result};
use crate::models::{Classification, Source};
use crate::reader::PageImage;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassificationReply {
    source: String,
    date: NaiveDate,
}

/// Extraction service speaking the OpenAI / Azure OpenAI chat-completions API
/// with JSON-schema constrained answers
pub struct ChatExtractionClient {
    client: Client,
    url: Url,
    provider: ExtractionProvider,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    retries: usize,
}

impl ChatExtractionClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.extraction, config.extraction_api_key())
    }

    pub fn new(config: &ExtractionConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: completions_url(config)?,
            provider: config.provider,
            model: config.model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            retries: config.max_retries,
        })
    }

    async fn send_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request.try_clone().ok_or_else(|| {
                Error::Extraction("Failed to clone extraction request".to_string())
            })?;
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => return Ok(ok.json::<T>().await?),
                    Err(e) => last_err = Some(Error::Extraction(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Extraction(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(500 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::Extraction("Extraction service request failed".to_string())
        }))
    }

    /// Run one schema-constrained completion and parse the answer as JSON
    async fn complete(
        &self,
        schema_name: &str,
        schema: Value,
        system: String,
        user: MessageContent,
    ) -> Result<Value> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Extraction API key not found in environment variable {}",
                self.api_key_env
            ))
        })?;

        let body = ChatRequest {
            model: match self.provider {
                ExtractionProvider::OpenAi => Some(self.model.as_str()),
                ExtractionProvider::Azure => None,
            },
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(system),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: schema_name,
                    schema,
                    strict: false,
                },
            },
        };

        let request = self.client.post(self.url.clone()).json(&body);
        let request = match self.provider {
            ExtractionProvider::OpenAi => request.bearer_auth(api_key),
            ExtractionProvider::Azure => request.header("api-key", api_key),
        };

        debug!("Requesting {} from extraction service", schema_name);
        let response: ChatResponse = self.send_with_retry(request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Extraction("Extraction service returned no content".to_string()))?;

        serde_json::from_str(&content).map_err(|e| {
            Error::Extraction(format!("Extraction service returned malformed JSON: {}", e))
        })
    }
}

#[async_trait]
impl ExtractionService for ChatExtractionClient {
    async fn classify(&self, text: &str) -> Result<Classification> {
        let value = self
            .complete(
                "classification",
                classification_schema(),
                prompts::CLASSIFY.to_string(),
                MessageContent::Text(format!("Classify the following text: {}", text)),
            )
            .await?;

        let reply: ClassificationReply = serde_json::from_value(value)
            .map_err(|e| Error::Classification(format!("Unexpected answer: {}", e)))?;
        let source = reply
            .source
            .parse::<Source>()
            .map_err(|e| Error::Classification(e.to_string()))?;

        Ok(Classification {
            source,
            date: reply.date,
        })
    }

    async fn extract(&self, capability: Capability, input: ExtractionInput) -> Result<TaskOutput> {
        let system = prompts::system_prompt(capability);
        let schema = response_schema(capability);

        match (capability, input) {
            (Capability::ChartAnalysis, ExtractionInput::Images(images)) => {
                let value = self
                    .complete(
                        capability.as_str(),
                        schema,
                        system,
                        image_message(&images),
                    )
                    .await?;
                let output = TaskOutput::from_json(capability, value)
                    .map_err(|e| Error::Extraction(e.to_string()))?;
                Ok(attach_images(output, images))
            }
            (Capability::ChartAnalysis, ExtractionInput::Text(_)) => Err(Error::Extraction(
                "chart_analysis expects document images".to_string(),
            )),
            (_, ExtractionInput::Images(_)) => Err(Error::Extraction(format!(
                "{} expects retrieved text",
                capability
            ))),
            (_, ExtractionInput::Text(context)) => {
                let value = self
                    .complete(
                        capability.as_str(),
                        schema,
                        system,
                        MessageContent::Text(context),
                    )
                    .await?;
                TaskOutput::from_json(capability, value)
                    .map_err(|e| Error::Extraction(e.to_string()))
            }
        }
    }
}

fn completions_url(config: &ExtractionConfig) -> Result<Url> {
    let mut base = config.endpoint.clone();
    if !base.ends_with('/') {
        base.push('/');
    }
    let base = Url::parse(&base)?;

    match config.provider {
        ExtractionProvider::OpenAi => Ok(base.join("chat/completions")?),
        ExtractionProvider::Azure => {
            let deployment = config.azure_deployment.as_deref().ok_or_else(|| {
                Error::Config("extraction.azure_deployment is not set".to_string())
            })?;
            let mut url = base.join(&format!("openai/deployments/{}/chat/completions", deployment))?;
            url.query_pairs_mut()
                .append_pair("api-version", &config.azure_api_version);
            Ok(url)
        }
    }
}

/// One caption part per image so the answer keeps the image order
fn image_message(images: &[PageImage]) -> MessageContent {
    let mut parts = vec![ContentPart::Text {
        text: format!(
            "Analyse the following {} chart images, one analysis per image in the order given:",
            images.len()
        ),
    }];
    for (n, image) in images.iter().enumerate() {
        let caption = match &image.title {
            Some(title) => format!("Chart {} (page {}): {}", n + 1, image.page, title),
            None => format!("Chart {} (page {})", n + 1, image.page),
        };
        parts.push(ContentPart::Text { text: caption });
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", image.mime_type, STANDARD.encode(&image.data)),
            },
        });
    }
    MessageContent::Parts(parts)
}

/// Pair analyses with images by position. A located title replaces the
/// service's title; analyses without an image are dropped.
fn attach_images(output: TaskOutput, images: Vec<PageImage>) -> TaskOutput {
    let mut report = match output {
        TaskOutput::Charts(report) => report,
        other => return other,
    };
    report.charts.truncate(images.len());
    for (chart, image) in report.charts.iter_mut().zip(images) {
        if let Some(title) = image.title {
            chart.title = title;
        }
        chart.page = image.page;
        chart.mime_type = image.mime_type;
        chart.image = image.data;
    }
    TaskOutput::Charts(report)
}
