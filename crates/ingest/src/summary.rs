//! Short institutional summaries of a legislator.
//!
//! Text comes from a [`SummaryGenerator`] when one is configured and answers
//! acceptably; otherwise a deterministic sentence is built from the record.

use async_trait::async_trait;
use congreso_core::{Chamber, LegislatorRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::html::normalize_space;

pub const MIN_SUMMARY_CHARS: usize = 400;
pub const MAX_SUMMARY_CHARS: usize = 1000;
/// A clamp only cuts at a sentence end found past this many characters.
const MIN_SENTENCE_CUT: usize = 250;
const BLOC_ACRONYMS: &[&str] = &["UCR", "PRO", "PJ", "ARI", "MST", "FIT"];

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-flash-latest"];

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("summary generator is not configured")]
    NotConfigured,
    #[error("{model} request failed: {reason}")]
    Request { model: String, reason: String },
    #[error("{model} returned HTTP {status}: {detail}")]
    Status {
        model: String,
        status: u16,
        detail: String,
    },
    #[error("{model} returned an unusable summary")]
    Rejected { model: String },
}

/// Fields a summary may mention. Optional ones are left out of the prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryInput {
    pub chamber: Chamber,
    pub display_name: String,
    pub district: String,
    pub bloc: String,
    pub term: String,
    pub profession: Option<String>,
    pub birth_date: Option<String>,
    pub total_projects: Option<u32>,
}

impl SummaryInput {
    pub fn from_record(record: &LegislatorRecord) -> Self {
        let non_empty = |value: &str| {
            let value = normalize_space(value);
            (!value.is_empty()).then_some(value)
        };
        Self {
            chamber: record.chamber,
            display_name: normalize_space(&record.display_name),
            district: normalize_space(&record.district),
            bloc: normalize_space(&record.bloc),
            term: normalize_space(&record.term),
            profession: non_empty(&record.profession),
            birth_date: non_empty(&record.birth_date),
            total_projects: Some(record.total_projects),
        }
    }
}

#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn generate(&self, input: &SummaryInput) -> Result<String, SummaryError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Gemini,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
}

/// Generated text when possible, the fallback sentence otherwise.
pub async fn summarize(generator: Option<&dyn SummaryGenerator>, input: &SummaryInput) -> Summary {
    let Some(generator) = generator else {
        return Summary {
            text: fallback_summary(input),
            source: SummarySource::Fallback,
        };
    };

    match generator.generate(input).await {
        Ok(text) if !is_legacy_summary(&text) => Summary {
            text,
            source: SummarySource::Gemini,
        },
        Ok(_) => {
            tracing::warn!(name = %input.display_name, "generated summary uses a retired template");
            Summary {
                text: fallback_summary(input),
                source: SummarySource::Fallback,
            }
        }
        Err(e) => {
            tracing::warn!(name = %input.display_name, error = %e, "summary generation failed, using fallback");
            Summary {
                text: fallback_summary(input),
                source: SummarySource::Fallback,
            }
        }
    }
}

/// Stored summaries written by earlier templates that should be regenerated.
pub fn is_legacy_summary(text: &str) -> bool {
    let normalized = normalize_space(text).to_lowercase();
    normalized.starts_with("quien es el o la")
        || normalized.contains(" argentin ")
        || normalized.starts_with("quién es la persona diputada o diputado")
        || normalized.starts_with("quién es la persona senadora o senador")
}

pub fn fallback_summary(input: &SummaryInput) -> String {
    let term = normalize_space(&input.term);
    let term_clause = if term.is_empty() {
        String::new()
    } else {
        format!(", con mandato {}", term)
    };

    let text = format!(
        "{} es {} por la provincia de {} e integra el bloque {}{}. En su rol parlamentario participa \
         en la elaboración, debate y seguimiento de iniciativas legislativas vinculadas a los intereses \
         de su distrito y a la agenda de su espacio político.",
        normalize_label(&input.display_name),
        input.chamber.role_label(),
        title_case(&input.district),
        format_bloc(&input.bloc),
        term_clause,
    );

    if text.chars().count() > MAX_SUMMARY_CHARS {
        let cut: String = text.chars().take(MAX_SUMMARY_CHARS - 3).collect();
        return format!("{}...", cut.trim_end());
    }
    text
}

fn normalize_label(value: &str) -> String {
    normalize_space(value).nfc().collect()
}

/// Lowercase everything, then uppercase the first letter of each word.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for ch in normalize_label(value).chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

/// Title case with party acronyms kept upper case.
pub fn format_bloc(value: &str) -> String {
    title_case(value)
        .split(' ')
        .map(|token| {
            let letters: String = token.chars().filter(|c| c.is_alphabetic()).collect::<String>().to_uppercase();
            if BLOC_ACRONYMS.contains(&letters.as_str()) {
                token.to_uppercase()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cut to `max_chars`, preferring the last complete sentence.
pub fn clamp_to_max_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let sliced: Vec<char> = text.chars().take(max_chars).collect();
    let last_sentence_end = sliced.iter().rposition(|c| matches!(c, '.' | '!' | '?'));
    match last_sentence_end {
        Some(end) if end > MIN_SENTENCE_CUT => sliced[..=end].iter().collect::<String>().trim().to_string(),
        _ => format!("{}...", sliced.iter().collect::<String>().trim_end()),
    }
}

fn forbidden_opening() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^(o[ií]d|escuchad|aqu[ií]|gentes de bien)\b").ok())
        .as_ref()
}

/// Normalised and clamped text, or `None` if it fails length or style checks.
pub fn accept_candidate(raw: &str) -> Option<String> {
    let cleaned = normalize_space(raw);
    if cleaned.is_empty() {
        return None;
    }
    if forbidden_opening().is_some_and(|re| re.is_match(&cleaned)) {
        return None;
    }
    let clamped = clamp_to_max_chars(&cleaned, MAX_SUMMARY_CHARS);
    (clamped.chars().count() >= MIN_SUMMARY_CHARS).then_some(clamped)
}

pub fn build_prompt(input: &SummaryInput) -> String {
    let mut lines = vec![
        "Escribí un resumen en español rioplatense con tono institucional claro, sin frases teatrales ni arcaicas.".to_string(),
        format!(
            "Longitud objetivo entre 450 y 800 caracteres (mínimo absoluto {}, máximo {}).",
            MIN_SUMMARY_CHARS, MAX_SUMMARY_CHARS
        ),
        "No inventes datos. No uses listas ni encabezados.".to_string(),
        "No empieces con fórmulas como \"Oíd\", \"Escuchad\", \"Aquí\", \"Gentes de bien\" o similares.".to_string(),
        "No uses comillas.".to_string(),
        "Debe ser un único párrafo.".to_string(),
        String::new(),
        "Datos:".to_string(),
        format!("- Cargo: {}", input.chamber.role_label()),
        format!("- Nombre: {}", normalize_label(&input.display_name)),
        format!("- Provincia: {}", title_case(&input.district)),
        format!("- Bloque: {}", format_bloc(&input.bloc)),
        format!("- Mandato: {}", normalize_space(&input.term)),
    ];
    if let Some(profession) = &input.profession {
        lines.push(format!("- Profesión: {}", normalize_space(profession)));
    }
    if let Some(birth_date) = &input.birth_date {
        lines.push(format!("- Fecha de nacimiento: {}", normalize_space(birth_date)));
    }
    if let Some(total) = input.total_projects {
        lines.push(format!("- Total de proyectos: {}", total));
    }
    lines.join("\n")
}

fn expansion_prompt(previous: &str) -> String {
    format!(
        "Reescribí y expandí el siguiente texto para que tenga entre 450 y 800 caracteres.\n\
         Mantené tono institucional claro y un único párrafo.\n\
         No agregues datos que no estén en el texto original.\n\n\
         Texto original:\n{}",
        previous
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default()
    }
}

/// [`SummaryGenerator`] backed by the Gemini `generateContent` endpoint.
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    models: Vec<String>,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, SummaryError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SummaryError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SummaryError::Request {
                model: "client".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            api_key,
            api_base: GEMINI_API_BASE.to_string(),
            models: GEMINI_MODELS.iter().map(|m| m.to_string()).collect(),
        })
    }

    async fn call(&self, model: &str, prompt: &str, temperature: f32, max_output_tokens: u32) -> Result<String, SummaryError> {
        let url = format!("{}/models/{}:generateContent", self.api_base, model);
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens,
            },
        };

        let request_error = |e: reqwest::Error| SummaryError::Request {
            model: model.to_string(),
            reason: e.to_string(),
        };
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail: String = response.text().await.unwrap_or_default().chars().take(180).collect();
            return Err(SummaryError::Status {
                model: model.to_string(),
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(request_error)?;
        Ok(parsed.text())
    }

    async fn generate_with(&self, model: &str, prompt: &str) -> Result<String, SummaryError> {
        let first = self.call(model, prompt, 0.6, 420).await?;
        if let Some(text) = accept_candidate(&first) {
            return Ok(text);
        }

        let cleaned = normalize_space(&first);
        if cleaned.is_empty() {
            return Err(SummaryError::Rejected {
                model: model.to_string(),
            });
        }
        tracing::debug!(model, length = cleaned.chars().count(), "summary rejected, asking for expansion");

        let expanded = self.call(model, &expansion_prompt(&cleaned), 0.5, 520).await?;
        accept_candidate(&expanded).ok_or_else(|| SummaryError::Rejected {
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl SummaryGenerator for GeminiGenerator {
    async fn generate(&self, input: &SummaryInput) -> Result<String, SummaryError> {
        let prompt = build_prompt(input);
        let mut last_error = SummaryError::NotConfigured;

        for model in &self.models {
            match self.generate_with(model, &prompt).await {
                Ok(text) => {
                    tracing::info!(model = %model, name = %input.display_name, "summary generated");
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "summary model failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
