//! Translator adapters.
//!
//! [`HttpTranslator`] calls an external translation service over HTTPS with
//! timeout, retry, and exponential backoff.  [`PhraseTableTranslator`] is a
//! deterministic offline fallback covering common short phrases; it is used
//! only when the relay is explicitly configured without a provider, never
//! as a silent fallback for failed online calls.
//!
//! Every adapter returns input verbatim when the source and target language
//! are equal or the text is whitespace-only — no external call is made.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::lang::Language;

/// The seam between the orchestrator and whichever translation backend is
/// configured.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source` into `target`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TranslationFailed`] when the backend cannot
    /// produce a translation.  Implementations never fabricate output.
    async fn translate(&self, text: &str, source: Language, target: Language) -> Result<String>;
}

/// Returns `Some(text)` when no translation work is needed.
fn short_circuit(text: &str, source: Language, target: Language) -> Option<String> {
    if source == target || text.trim().is_empty() {
        Some(text.to_string())
    } else {
        None
    }
}

// ── HTTP adapter ─────────────────────────────────────────────────────

/// Configuration for the external translation service.
#[derive(Debug, Clone)]
pub struct HttpTranslatorConfig {
    /// API key sent with every request.
    pub api_key: String,
    /// Service base URL, e.g. `https://translate.example.com`.
    pub base_url: String,
    /// Hard per-call deadline.
    pub timeout: Duration,
    /// Total attempts per translation (first try + retries).
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles each retry.
    pub initial_backoff: Duration,
}

impl HttpTranslatorConfig {
    /// Sensible defaults for a given key and endpoint.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Calls an external translation service speaking the
/// `POST /translate {q, source, target}` JSON dialect.
pub struct HttpTranslator {
    config: HttpTranslatorConfig,
    http: reqwest::Client,
}

impl HttpTranslator {
    /// Build the adapter and its HTTP client.
    ///
    /// # Errors
    ///
    /// Fails when the API key is empty or the client cannot be constructed.
    pub fn new(config: HttpTranslatorConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(PipelineError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::TranslatorUnavailable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// One request/response exchange, no retries.
    async fn request_once(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<String> {
        let url = format!("{}/translate", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "q": text,
            "source": source.as_code(),
            "target": target.as_code(),
            "format": "text",
            "api_key": self.config.api_key,
        });

        debug!(%source, %target, chars = text.chars().count(), "sending translation request");

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::TranslatorUnavailable {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let payload = resp
            .text()
            .await
            .map_err(|e| PipelineError::TranslatorUnavailable {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(PipelineError::TranslationFailed {
                target,
                reason: format!("service returned {status}: {payload}"),
            });
        }

        let v: Value =
            serde_json::from_str(&payload).map_err(|e| PipelineError::TranslatorParseFailed {
                reason: format!("invalid JSON response: {e}"),
            })?;

        v["translatedText"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| PipelineError::TranslatorParseFailed {
                reason: "missing `translatedText` in response".into(),
            })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, source: Language, target: Language) -> Result<String> {
        if let Some(verbatim) = short_circuit(text, source, target) {
            return Ok(verbatim);
        }

        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            match self.request_once(text, source, target).await {
                Ok(translated) => return Ok(translated),
                Err(err) => {
                    warn!(
                        attempt,
                        max = self.config.max_attempts,
                        %target,
                        error = %err,
                        "translation attempt failed"
                    );
                    last_error = Some(err);
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(match last_error {
            Some(err) => err,
            None => PipelineError::TranslationFailed {
                target,
                reason: "no attempts were made".into(),
            },
        })
    }
}

// ── phrase-table fallback ────────────────────────────────────────────

/// Columns follow [`Language::ALL`] order:
/// en, es, fr, de, it, pt, ru, ja, ko, zh, ar, hi.
const PHRASES: &[[&str; 12]] = &[
    [
        "hello", "hola", "bonjour", "hallo", "ciao", "olá", "привет", "こんにちは", "안녕하세요",
        "你好", "مرحبا", "नमस्ते",
    ],
    [
        "goodbye", "adiós", "au revoir", "auf wiedersehen", "arrivederci", "adeus",
        "до свидания", "さようなら", "안녕히 가세요", "再见", "مع السلامة", "अलविदा",
    ],
    [
        "thank you", "gracias", "merci", "danke", "grazie", "obrigado", "спасибо", "ありがとう",
        "감사합니다", "谢谢", "شكرا", "धन्यवाद",
    ],
    [
        "please", "por favor", "s'il vous plaît", "bitte", "per favore", "por favor",
        "пожалуйста", "お願いします", "부탁합니다", "请", "من فضلك", "कृपया",
    ],
    [
        "yes", "sí", "oui", "ja", "sì", "sim", "да", "はい", "네", "是", "نعم", "हाँ",
    ],
    [
        "no", "no", "non", "nein", "no", "não", "нет", "いいえ", "아니요", "不", "لا", "नहीं",
    ],
    [
        "good morning", "buenos días", "bonjour", "guten morgen", "buongiorno", "bom dia",
        "доброе утро", "おはようございます", "좋은 아침", "早上好", "صباح الخير", "सुप्रभात",
    ],
    [
        "how are you", "cómo estás", "comment ça va", "wie geht es dir", "come stai",
        "como vai", "как дела", "お元気ですか", "어떻게 지내세요", "你好吗", "كيف حالك",
        "आप कैसे हैं",
    ],
    [
        "welcome", "bienvenido", "bienvenue", "willkommen", "benvenuto", "bem-vindo",
        "добро пожаловать", "ようこそ", "환영합니다", "欢迎", "أهلا بك", "स्वागत है",
    ],
];

/// Deterministic offline translator backed by a small built-in phrase
/// table.  A miss returns the input prefixed with the target-language tag
/// (`[fr] …`); callers may treat that as a failed translation.
pub struct PhraseTableTranslator;

impl PhraseTableTranslator {
    fn column(lang: Language) -> usize {
        Language::ALL
            .iter()
            .position(|&l| l == lang)
            .unwrap_or(0)
    }

    /// Look up `text` in the table, preferring the source-language column.
    fn lookup(text: &str, source: Language, target: Language) -> Option<String> {
        let needle = text.trim().to_lowercase();
        let source_col = Self::column(source);
        let target_col = Self::column(target);

        // Exact hit in the claimed source language first, then any column
        // (detection may have been wrong about a short greeting).
        let by_source = PHRASES
            .iter()
            .find(|row| row[source_col].to_lowercase() == needle);
        let row = by_source.or_else(|| {
            PHRASES
                .iter()
                .find(|row| row.iter().any(|cell| cell.to_lowercase() == needle))
        })?;

        Some(row[target_col].to_string())
    }
}

#[async_trait]
impl Translator for PhraseTableTranslator {
    async fn translate(&self, text: &str, source: Language, target: Language) -> Result<String> {
        if let Some(verbatim) = short_circuit(text, source, target) {
            return Ok(verbatim);
        }

        match Self::lookup(text, source, target) {
            Some(hit) => Ok(hit),
            None => {
                debug!(%target, "phrase table miss, returning tagged original");
                Ok(format!("[{}] {}", target.as_code(), text))
            }
        }
    }
}
