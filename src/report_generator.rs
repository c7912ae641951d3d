use crate::config::ReportConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const SYSTEM_PROMPT: &str =
    "You are a medical assistant specialised in writing complete clinical reports.";

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("request to text-generation API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("text-generation API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("text-generation API response missing content")]
    MissingContent,
}

/// Clinical fields that go into one report prompt.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub specialty: String,
    pub patient_name: String,
    pub patient_sex: String,
    pub patient_age: u32,
    pub diagnosis: String,
    pub prescriptions: String,
    pub physician_name: String,
}

impl ReportRequest {
    pub fn prompt(&self) -> String {
        format!(
            "Write a detailed medical report for a {specialty} consultation.\n\
             \n\
             **Patient:**\n\
             - Name: {name}\n\
             - Sex: {sex}\n\
             - Age: {age} years\n\
             \n\
             **Diagnosis:**\n\
             {diagnosis}\n\
             \n\
             **Prescriptions:**\n\
             {prescriptions}\n\
             \n\
             **Attending physician:**\n\
             {physician}\n\
             \n\
             **Signature:** ____________________\n\
             **Licence no.:** [physician registration number]\n\
             \n\
             **Write a detailed clinical report from the information above, covering:**\n\
             1. **Clinical summary**: an introduction to the case based on the diagnosis and prescriptions.\n\
             2. **Medical history and symptoms**: the patient's condition, reported symptoms and relevant factors.\n\
             3. **Treatment plan**: therapeutic approaches and recommendations based on the diagnosis.\n\
             4. **Medical recommendations**: necessary care, lifestyle changes or further tests.\n\
             5. **Prognosis**: the expected evolution of the patient's condition.\n",
            specialty = self.specialty,
            name = self.patient_name,
            sex = self.patient_sex,
            age = self.patient_age,
            diagnosis = self.diagnosis,
            prescriptions = self.prescriptions,
            physician = self.physician_name,
        )
    }
}

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, request: &ReportRequest) -> Result<String, GeneratorError>;

    fn provider_name(&self) -> &'static str;
}

pub struct OpenAiReportGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiReportGenerator {
    pub fn new(config: &ReportConfig) -> Result<Self, GeneratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ReportGenerator for OpenAiReportGenerator {
    async fn generate(&self, request: &ReportRequest) -> Result<String, GeneratorError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": request.prompt()}
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = resp.json().await?;

        // choices[0].message.content
        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(GeneratorError::MissingContent)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
