use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, ANTHROPIC_API_URL};
use crate::error::{AppError, Result};
use crate::types::Scale;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// External text-classification collaborator. Implementations report
/// failures as errors; `Classifier` decides what an error means.
#[async_trait]
pub trait TextClassifier: Send + Sync {
    /// An entry of `existing` that is an exact synonym of `candidate`, if any.
    async fn propose_synonym(&self, candidate: &str, existing: &[String]) -> Result<Option<String>>;

    /// Independent yes/no check that `candidate` and `existing` name the same thing.
    async fn confirm_synonym(&self, candidate: &str, existing: &str) -> Result<bool>;

    async fn classify_scale(&self, keyword: &str) -> Result<Scale>;
}

/// Fail-open front for the classification collaborator.
///
/// | call               | on error / no backend |
/// |--------------------|-----------------------|
/// | `propose_synonym`  | `None`                |
/// | `confirm_synonym`  | `false`               |
/// | `classify_scale`   | `Scale::Macro`        |
#[derive(Clone, Default)]
pub struct Classifier {
    backend: Option<Arc<dyn TextClassifier>>,
}

impl Classifier {
    pub fn new(backend: Arc<dyn TextClassifier>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn disabled() -> Self {
        Self { backend: None }
    }

    /// Claude-backed when an API key is configured, otherwise disabled.
    pub fn from_config(cfg: &Config, http: reqwest::Client) -> Self {
        match &cfg.anthropic_api_key {
            Some(key) => Self::new(Arc::new(ClaudeClassifier::new(
                key,
                &cfg.classifier_model,
                http,
            ))),
            None => {
                warn!("ANTHROPIC_API_KEY not set: synonym checks and scale classification use defaults");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Proposed synonym resolved against `existing` (case-insensitive).
    /// Replies naming something outside the list are ignored.
    pub async fn propose_synonym(&self, candidate: &str, existing: &[String]) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.propose_synonym(candidate, existing).await {
            Ok(Some(reply)) => {
                let reply = reply.trim().to_lowercase();
                existing.iter().find(|k| k.to_lowercase() == reply).cloned()
            }
            Ok(None) => None,
            Err(e) => {
                warn!(candidate, "Synonym proposal failed: {e}");
                None
            }
        }
    }

    pub async fn confirm_synonym(&self, candidate: &str, existing: &str) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        backend
            .confirm_synonym(candidate, existing)
            .await
            .unwrap_or_else(|e| {
                warn!(candidate, existing, "Synonym confirmation failed: {e}");
                false
            })
    }

    pub async fn classify_scale(&self, keyword: &str) -> Scale {
        let Some(backend) = self.backend.as_ref() else {
            return Scale::Macro;
        };
        backend.classify_scale(keyword).await.unwrap_or_else(|e| {
            warn!(keyword, "Scale classification failed: {e}");
            Scale::Macro
        })
    }

    /// Existing keyword that `candidate` duplicates. With `require_confirmation`
    /// a match needs both the proposal and a separate confirmation.
    pub async fn find_synonym(
        &self,
        candidate: &str,
        existing: &[String],
        require_confirmation: bool,
    ) -> Option<String> {
        let others: Vec<String> = existing
            .iter()
            .filter(|k| k.as_str() != candidate)
            .cloned()
            .collect();
        if others.is_empty() {
            return None;
        }

        let proposed = self.propose_synonym(candidate, &others).await?;
        if !require_confirmation {
            return Some(proposed);
        }
        if self.confirm_synonym(candidate, &proposed).await {
            Some(proposed)
        } else {
            debug!(candidate, proposed = %proposed, "Synonym proposal not confirmed");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Claude backend
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage>,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string()
    }
}

/// Anthropic messages API client carrying the synonym and scale prompts.
pub struct ClaudeClassifier {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl ClaudeClassifier {
    pub fn new(api_key: &str, model: &str, http: reqwest::Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http,
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| AppError::Classification(format!("invalid api key header: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn ask(&self, prompt: String, max_tokens: u32) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Classification(format!("Claude API error ({status}): {body}")));
        }

        let parsed: MessagesResponse = response.json().await?;
        Ok(parsed.text())
    }
}

fn synonym_prompt(candidate: &str, existing: &[String]) -> String {
    let list = existing
        .iter()
        .map(|k| format!("- {k}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "New fashion trend keyword: \"{candidate}\"\n\n\
         Existing tracked keywords:\n{list}\n\n\
         Is the new keyword an EXACT SYNONYM of any existing keyword, meaning two different names \
         for the literally identical item or trend? \
         Examples of true synonyms: 'draped top' = 'draped top blouse', 'barrel leg jeans' = 'barrel jeans'. \
         Distinct named aesthetics, styles, or movements are NEVER duplicates, even if they share \
         visual overlap or mood (e.g. 'goth' != 'dark academia', 'quiet luxury' != 'old money', \
         'cottagecore' != 'boho', 'minimalism' != 'quiet luxury'). \
         Only reply with a matching keyword if you are certain they are two names for the exact same thing. \
         When in doubt, reply none. \
         Reply with ONLY the exact matching keyword from the list above, or reply with ONLY the word: none"
    )
}

fn confirm_prompt(candidate: &str, existing: &str) -> String {
    format!(
        "Are \"{candidate}\" and \"{existing}\" literally two different names for the \
         exact same fashion trend or item? Not just related, similar, or overlapping, \
         but the exact same thing with different wording. \
         ('draped top' and 'draped blouse' = YES. \
         'goth' and 'dark academia' = NO. 'quiet luxury' and 'old money' = NO.) \
         Answer with ONLY: YES or NO"
    )
}

fn scale_prompt(keyword: &str) -> String {
    format!(
        "Fashion keyword: \"{keyword}\"\n\n\
         Classify as MACRO or MICRO using these criteria:\n\n\
         MACRO = long-term (years/decades), broad societal or industry shift, \
         driven by deep cultural value changes, adopted mainstream. \
         Examples: quiet luxury, old money, gorpcore, maximalism, sustainability, minimalism, utility wear.\n\n\
         MICRO = short-lived (weeks/months), niche, accelerated by social media virality, \
         fades quickly, adopted by trend-conscious minority. \
         Examples: barbiecore, mob wife aesthetic, cottagecore, dark academia, blokecore, \
         tenniscore, ballet flats, cherry red, barrel-leg jeans.\n\n\
         Key question: Is this a lasting cultural shift (macro) or a social-media-driven fad (micro)?\n\
         Reply with ONLY one word: macro or micro"
    )
}

fn parse_proposal(reply: &str) -> Option<String> {
    let reply = reply.trim().to_lowercase();
    if reply.is_empty() || reply == "none" {
        None
    } else {
        Some(reply)
    }
}

fn parse_scale(reply: &str) -> Scale {
    if reply.to_lowercase().contains("micro") {
        Scale::Micro
    } else {
        Scale::Macro
    }
}

#[async_trait]
impl TextClassifier for ClaudeClassifier {
    async fn propose_synonym(&self, candidate: &str, existing: &[String]) -> Result<Option<String>> {
        let reply = self.ask(synonym_prompt(candidate, existing), 50).await?;
        Ok(parse_proposal(&reply))
    }

    async fn confirm_synonym(&self, candidate: &str, existing: &str) -> Result<bool> {
        let reply = self.ask(confirm_prompt(candidate, existing), 10).await?;
        Ok(reply.trim().to_uppercase() == "YES")
    }

    async fn classify_scale(&self, keyword: &str) -> Result<Scale> {
        let reply = self.ask(scale_prompt(keyword), 10).await?;
        Ok(parse_scale(&reply))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted collaborator. `None` in a field means that call errors.
    #[derive(Default)]
    pub(crate) struct FakeClassifier {
        pub proposal: Option<Option<String>>,
        pub confirmation: Option<bool>,
        pub scale: Option<Scale>,
        pub confirm_calls: AtomicUsize,
    }

    #[async_trait]
    impl TextClassifier for FakeClassifier {
        async fn propose_synonym(&self, _candidate: &str, _existing: &[String]) -> Result<Option<String>> {
            self.proposal
                .clone()
                .ok_or_else(|| AppError::Classification("proposal unavailable".into()))
        }

        async fn confirm_synonym(&self, _candidate: &str, _existing: &str) -> Result<bool> {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);
            self.confirmation
                .ok_or_else(|| AppError::Classification("confirmation unavailable".into()))
        }

        async fn classify_scale(&self, _keyword: &str) -> Result<Scale> {
            self.scale
                .ok_or_else(|| AppError::Classification("scale unavailable".into()))
        }
    }

    fn existing() -> Vec<String> {
        vec!["barrel jeans".to_string(), "goth".to_string()]
    }

    #[tokio::test]
    async fn suppression_needs_proposal_and_confirmation() {
        let fake = Arc::new(FakeClassifier {
            proposal: Some(Some("Barrel Jeans".to_string())),
            confirmation: Some(true),
            ..Default::default()
        });
        let classifier = Classifier::new(fake.clone());
        assert_eq!(
            classifier.find_synonym("barrel leg jeans", &existing(), true).await,
            Some("barrel jeans".to_string())
        );
        assert_eq!(fake.confirm_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn false_confirmation_lets_candidate_through() {
        let classifier = Classifier::new(Arc::new(FakeClassifier {
            proposal: Some(Some("goth".to_string())),
            confirmation: Some(false),
            ..Default::default()
        }));
        assert_eq!(classifier.find_synonym("dark academia", &existing(), true).await, None);
    }

    #[tokio::test]
    async fn failed_confirmation_fails_open() {
        let classifier = Classifier::new(Arc::new(FakeClassifier {
            proposal: Some(Some("goth".to_string())),
            confirmation: None,
            ..Default::default()
        }));
        assert_eq!(classifier.find_synonym("trad goth", &existing(), true).await, None);
    }

    #[tokio::test]
    async fn suggestions_skip_the_second_call() {
        let fake = Arc::new(FakeClassifier {
            proposal: Some(Some("goth".to_string())),
            confirmation: Some(false),
            ..Default::default()
        });
        let classifier = Classifier::new(fake.clone());
        assert_eq!(
            classifier.find_synonym("trad goth", &existing(), false).await,
            Some("goth".to_string())
        );
        assert_eq!(fake.confirm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn replies_outside_the_list_are_ignored() {
        let classifier = Classifier::new(Arc::new(FakeClassifier {
            proposal: Some(Some("cottagecore".to_string())),
            confirmation: Some(true),
            ..Default::default()
        }));
        assert_eq!(classifier.find_synonym("boho", &existing(), true).await, None);
    }

    #[tokio::test]
    async fn defaults_apply_on_error_and_without_backend() {
        let failing = Classifier::new(Arc::new(FakeClassifier::default()));
        assert_eq!(failing.propose_synonym("x", &existing()).await, None);
        assert!(!failing.confirm_synonym("x", "goth").await);
        assert_eq!(failing.classify_scale("x").await, Scale::Macro);

        let disabled = Classifier::disabled();
        assert!(!disabled.is_enabled());
        assert_eq!(disabled.find_synonym("x", &existing(), true).await, None);
        assert_eq!(disabled.classify_scale("x").await, Scale::Macro);
    }

    #[tokio::test]
    async fn candidate_is_never_its_own_synonym() {
        let classifier = Classifier::new(Arc::new(FakeClassifier {
            proposal: Some(Some("goth".to_string())),
            confirmation: Some(true),
            ..Default::default()
        }));
        assert_eq!(classifier.find_synonym("goth", &["goth".to_string()], true).await, None);
    }

    #[test]
    fn reply_parsing() {
        assert_eq!(parse_proposal(" None "), None);
        assert_eq!(parse_proposal("Goth\n"), Some("goth".to_string()));
        assert_eq!(parse_scale("MICRO"), Scale::Micro);
        assert_eq!(parse_scale("macro."), Scale::Macro);

        let resp: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":" micro "}],"stop_reason":"end_turn"}"#,
        )
        .unwrap();
        assert_eq!(resp.text(), "micro");
    }
}
