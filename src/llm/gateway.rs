//! Completion gateway: walks the escalation ladder until a rung succeeds.
//!
//! Failure policy is fire-and-forget: each rung gets exactly one attempt
//! per call, escalation is sticky, and there is no backoff loop to storm a
//! struggling endpoint. The only thing a caller ever sees on failure is
//! `GatewayError::Exhausted` after the final rung.

use crate::config::LlmConfig;
use crate::conversation::PromptContext;
use crate::error::GatewayError;
use crate::llm::ladder::{Ladder, Rung};

use anyhow::Context as _;

/// Hard ceiling on outbound reply length (the platform's message-size limit).
const MAX_REPLY_CHARS: usize = 2000;

/// Appended when a reply is cut at the ceiling.
const TRUNCATION_SUFFIX: &str = "...";

/// Fixed sampling knobs for every completion call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&LlmConfig> for GenerationParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

/// A successful gateway call: the constrained reply text plus any
/// side-channel escalation notices produced while getting there.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub notices: Vec<String>,
}

/// One attempt against the completion endpoint with a specific rung.
/// Seam between the ladder-walking logic and the wire protocol.
pub trait CompletionApi: Send + Sync {
    fn complete(
        &self,
        rung: &Rung,
        context: &PromptContext,
        params: &GenerationParams,
    ) -> impl std::future::Future<Output = Result<String, GatewayError>> + Send;
}

/// Gateway over the completion endpoint with sticky multi-rung fallback.
pub struct CompletionGateway<A> {
    api: A,
    ladder: Ladder,
    params: GenerationParams,
}

impl<A: CompletionApi> CompletionGateway<A> {
    pub fn new(api: A, ladder: Ladder, params: GenerationParams) -> Self {
        Self {
            api,
            ladder,
            params,
        }
    }

    /// Call the endpoint, escalating through the ladder on failure.
    ///
    /// Starts at the current sticky rung. Every escalation advances the
    /// process-wide active index and records a notice for the caller to
    /// surface alongside the reply. Success returns the reply trimmed and
    /// clamped to the platform ceiling.
    pub async fn complete(&self, context: &PromptContext) -> Result<Completion, GatewayError> {
        let mut notices = Vec::new();
        let mut index = self.ladder.active_index();
        let mut attempts = 0;

        loop {
            let rung = self.ladder.rung(index);
            attempts += 1;

            match self.api.complete(rung, context, &self.params).await {
                Ok(raw) => {
                    let text = clamp_reply(&raw);
                    tracing::debug!(
                        model = %rung.model,
                        chars = text.chars().count(),
                        attempts,
                        "completion succeeded"
                    );
                    return Ok(Completion { text, notices });
                }
                Err(error) => match self.ladder.advance(index) {
                    Some(next) => {
                        tracing::warn!(%error, model = %rung.model, "completion attempt failed, escalating");
                        notices.push(self.ladder.escalation_notice(index, next));
                        index = next;
                    }
                    None => {
                        tracing::error!(%error, attempts, "completion ladder exhausted");
                        return Err(GatewayError::Exhausted {
                            attempts,
                            last_error: error.to_string(),
                        });
                    }
                },
            }
        }
    }
}

/// Trim the raw reply and clamp it to the platform message-size ceiling:
/// anything longer keeps the first 1997 characters plus a 3-character
/// ellipsis, exactly 2000 total.
fn clamp_reply(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MAX_REPLY_CHARS {
        return trimmed.to_string();
    }
    let mut clamped: String = trimmed
        .chars()
        .take(MAX_REPLY_CHARS - TRUNCATION_SUFFIX.len())
        .collect();
    clamped.push_str(TRUNCATION_SUFFIX);
    clamped
}

/// Convert a prompt context into the wire message list: system prompt,
/// history in order, then the new user turn.
fn wire_messages(context: &PromptContext) -> Vec<serde_json::Value> {
    let mut messages = Vec::with_capacity(context.turns.len() + 2);
    messages.push(serde_json::json!({
        "role": "system",
        "content": context.system_prompt.as_ref(),
    }));
    for turn in &context.turns {
        messages.push(serde_json::json!({
            "role": turn.role.as_str(),
            "content": turn.content,
        }));
    }
    messages.push(serde_json::json!({
        "role": "user",
        "content": context.user_text,
    }));
    messages
}

/// Real wire implementation against an OpenAI-compatible chat completions
/// endpoint (Groq by default).
pub struct HttpCompletionApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCompletionApi {
    /// Build the shared HTTP client. The request timeout bounds every
    /// ladder attempt; a timeout is a failure like any other.
    pub fn new(config: &LlmConfig) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl CompletionApi for HttpCompletionApi {
    async fn complete(
        &self,
        rung: &Rung,
        context: &PromptContext,
        params: &GenerationParams,
    ) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "model": rung.model,
            "messages": wire_messages(context),
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
        });

        let chat_completions_url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&chat_completions_url)
            .header("authorization", format!("Bearer {}", rung.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| GatewayError::Provider(format!("failed to read response body: {e}")))?;

        let response_body: serde_json::Value =
            serde_json::from_str(&response_text).map_err(|e| {
                GatewayError::MalformedResponse(format!(
                    "response ({status}) is not valid JSON: {e}\nBody: {}",
                    truncate_body(&response_text)
                ))
            })?;

        if !status.is_success() {
            let message = response_body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            return Err(GatewayError::Provider(format!(
                "completion endpoint error ({status}): {message}"
            )));
        }

        response_body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::MalformedResponse(format!(
                    "no message content in response: {}",
                    truncate_body(&response_text)
                ))
            })
    }
}

/// Cap a response body for inclusion in error messages.
fn truncate_body(body: &str) -> &str {
    const LIMIT: usize = 500;
    match body.char_indices().nth(LIMIT) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::history::{Role, Turn};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted fake endpoint: pops one outcome per attempt and logs which
    /// (key, model) rung each attempt used.
    struct ScriptedApi {
        outcomes: Mutex<VecDeque<Result<String, GatewayError>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedApi {
        fn new(outcomes: Vec<Result<String, GatewayError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CompletionApi for ScriptedApi {
        async fn complete(
            &self,
            rung: &Rung,
            _context: &PromptContext,
            _params: &GenerationParams,
        ) -> Result<String, GatewayError> {
            self.calls
                .lock()
                .unwrap()
                .push((rung.api_key.clone(), rung.model.clone()));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Provider("script exhausted".into())))
        }
    }

    fn gateway(
        api: ScriptedApi,
        keys: &[&str],
        models: &[&str],
    ) -> CompletionGateway<ScriptedApi> {
        let keys: Vec<String> = keys.iter().map(|s| s.to_string()).collect();
        let models: Vec<String> = models.iter().map(|s| s.to_string()).collect();
        CompletionGateway::new(
            api,
            Ladder::new(&keys, &models),
            GenerationParams {
                max_tokens: 600,
                temperature: 0.8,
                top_p: 0.9,
            },
        )
    }

    fn context() -> PromptContext {
        PromptContext::new("persona".into(), Vec::new(), "hello")
    }

    fn provider_err() -> Result<String, GatewayError> {
        Err(GatewayError::Provider("boom".into()))
    }

    #[tokio::test]
    async fn first_rung_success_produces_no_notices() {
        let gateway = gateway(
            ScriptedApi::new(vec![Ok("  hi there  ".into())]),
            &["k1", "k2"],
            &["m1"],
        );

        let completion = gateway.complete(&context()).await.expect("success");
        assert_eq!(completion.text, "hi there");
        assert!(completion.notices.is_empty());
    }

    #[tokio::test]
    async fn primary_failure_escalates_to_backup_key_with_notice() {
        let gateway = gateway(
            ScriptedApi::new(vec![provider_err(), Ok("saved".into())]),
            &["k1", "k2"],
            &["m1"],
        );

        let completion = gateway.complete(&context()).await.expect("fallback succeeds");
        assert_eq!(completion.text, "saved");
        assert_eq!(completion.notices.len(), 1);
        assert!(completion.notices[0].contains("backup key"));
        assert_eq!(
            gateway.api.calls(),
            vec![
                ("k1".to_string(), "m1".to_string()),
                ("k2".to_string(), "m1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn model_fallback_is_tried_before_the_next_credential() {
        let gateway = gateway(
            ScriptedApi::new(vec![provider_err(), Ok("ok".into())]),
            &["k1", "k2"],
            &["m1", "m2"],
        );

        let completion = gateway.complete(&context()).await.expect("success");
        assert!(completion.notices[0].contains("m2"));
        assert_eq!(
            gateway.api.calls(),
            vec![
                ("k1".to_string(), "m1".to_string()),
                ("k1".to_string(), "m2".to_string()),
            ]
        );
    }

    /// Once a fallback rung is active, a later call never touches the
    /// primary again, even within the same process.
    #[tokio::test]
    async fn escalation_is_sticky_across_calls() {
        let gateway = gateway(
            ScriptedApi::new(vec![provider_err(), Ok("first".into()), Ok("second".into())]),
            &["k1", "k2"],
            &["m1"],
        );

        gateway.complete(&context()).await.expect("first call");
        let completion = gateway.complete(&context()).await.expect("second call");

        assert_eq!(completion.text, "second");
        assert!(completion.notices.is_empty());
        let calls = gateway.api.calls();
        assert_eq!(calls[2], ("k2".to_string(), "m1".to_string()));
        assert!(!calls[2..].iter().any(|(key, _)| key == "k1"));
    }

    #[tokio::test]
    async fn exhausting_every_rung_reports_total_failure() {
        let gateway = gateway(
            ScriptedApi::new(vec![provider_err(), provider_err()]),
            &["k1", "k2"],
            &["m1"],
        );

        let error = gateway.complete(&context()).await.expect_err("must fail");
        match error {
            GatewayError::Exhausted { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {other}"),
        }

        // The next call retries only the last rung.
        let error = gateway.complete(&context()).await.expect_err("still down");
        match error {
            GatewayError::Exhausted { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(gateway.api.calls().len(), 3);
    }

    #[tokio::test]
    async fn overlong_reply_is_clamped_to_exactly_the_ceiling() {
        let long_reply = "a".repeat(2500);
        let gateway = gateway(ScriptedApi::new(vec![Ok(long_reply)]), &["k1"], &["m1"]);

        let completion = gateway.complete(&context()).await.expect("success");
        assert_eq!(completion.text.chars().count(), 2000);
        assert!(completion.text.ends_with("..."));
        assert!(completion.text[..1997].chars().all(|c| c == 'a'));
    }

    #[test]
    fn reply_at_the_ceiling_is_left_alone() {
        let exact = "b".repeat(2000);
        assert_eq!(clamp_reply(&exact), exact);
    }

    #[test]
    fn wire_order_is_system_then_history_then_user() {
        let context = PromptContext::new(
            "persona".into(),
            vec![
                Turn::new(Role::User, "q1"),
                Turn::new(Role::Assistant, "a1"),
            ],
            "q2",
        );

        let messages = wire_messages(&context);
        let roles: Vec<&str> = messages
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[0]["content"], "persona");
        assert_eq!(messages[3]["content"], "q2");
    }
}
