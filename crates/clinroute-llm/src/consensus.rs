//! Consensus - ask several models and measure how much they agree
//!
//! Every model is reached through [`LlmRouter::route_to`], so breakers and
//! the retry policy apply exactly as for a normal routed call. An optional
//! critic model then reviews the successful outputs and writes one answer.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::request::{LlmRequest, LlmResponse};
use crate::router::{LlmRouter, ModelChoice, TaskType};

const CRITIC_SYSTEM_PROMPT: &str = "You review answers written independently by several \
assistants for the same request. Point out factual disagreements, then write a single \
final answer that keeps only what is well supported.";

/// Outcome of a consensus run
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusResult {
    /// One response per requested model, in request order
    pub responses: Vec<LlmResponse>,
    /// Mean pairwise Jaccard similarity of successful outputs
    pub agreement: f64,
    /// Critic response, when a critique pass ran
    pub critique: Option<LlmResponse>,
    /// Synthesized answer, or the first successful output without a critic
    pub final_answer: Option<String>,
}

impl ConsensusResult {
    /// Number of models that answered successfully
    #[must_use]
    pub fn successful(&self) -> usize {
        self.responses.iter().filter(|r| r.success).count()
    }
}

/// Runs one request against several models concurrently
pub struct ConsensusOrchestrator {
    router: Arc<LlmRouter>,
    critic: Option<ModelChoice>,
}

impl ConsensusOrchestrator {
    /// Create an orchestrator without a critique pass
    #[must_use]
    pub fn new(router: Arc<LlmRouter>) -> Self {
        Self { router, critic: None }
    }

    /// Review candidate outputs with `critic`
    #[must_use]
    pub fn with_critic(mut self, critic: ModelChoice) -> Self {
        self.critic = Some(critic);
        self
    }

    /// Ask every model in `choices` and score their agreement.
    ///
    /// # Errors
    /// Only [`crate::Error::Cancelled`], when the request's token fires.
    #[instrument(skip(self, choices, request), fields(task = %task, models = choices.len()))]
    pub async fn run(
        &self,
        task: TaskType,
        choices: &[ModelChoice],
        request: &LlmRequest,
    ) -> Result<ConsensusResult> {
        let calls = choices
            .iter()
            .map(|choice| self.router.route_to(task, choice, request));
        let responses = join_all(calls)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let outputs: Vec<&str> = responses
            .iter()
            .filter(|r| r.success)
            .map(|r| r.content.as_str())
            .collect();
        let agreement = agreement_score(&outputs);

        info!(
            successful = outputs.len(),
            agreement = agreement,
            "Consensus candidates collected"
        );

        let critique = match (&self.critic, outputs.is_empty()) {
            (Some(critic), false) => {
                let review = critique_request(request, &outputs);
                let response = self.router.route_to(TaskType::Critique, critic, &review).await?;
                if !response.success {
                    warn!(critic = %critic, error = response.error_message(), "Critique pass failed");
                }
                Some(response)
            }
            _ => None,
        };

        let final_answer = critique
            .as_ref()
            .filter(|c| c.success)
            .map(|c| c.content.clone())
            .or_else(|| outputs.first().map(|s| (*s).to_string()));

        Ok(ConsensusResult {
            responses,
            agreement,
            critique,
            final_answer,
        })
    }
}

fn critique_request(original: &LlmRequest, outputs: &[&str]) -> LlmRequest {
    let mut prompt = format!("Request:\n{}\n", original.user_content());
    for (i, output) in outputs.iter().enumerate() {
        prompt.push_str(&format!("\nAnswer {}:\n{}\n", i + 1, output));
    }

    let mut review = LlmRequest::new(prompt)
        .with_system_prompt(CRITIC_SYSTEM_PROMPT)
        .with_response_format(original.response_format)
        .with_cancellation(original.cancellation.clone());
    review.max_tokens = original.max_tokens;
    review
}

fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Mean pairwise Jaccard similarity of normalized word sets.
///
/// 1.0 for a single output, 0.0 for none.
#[must_use]
pub fn agreement_score(outputs: &[&str]) -> f64 {
    match outputs.len() {
        0 => 0.0,
        1 => 1.0,
        n => {
            let sets: Vec<_> = outputs.iter().map(|o| word_set(o)).collect();
            let mut total = 0.0;
            for i in 0..n {
                for j in (i + 1)..n {
                    total += jaccard(&sets[i], &sets[j]);
                }
            }
            total / (n * (n - 1) / 2) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::router::{MockProvider, MockReply, RouterConfig};
    use clinroute_core::BreakerRegistry;
    use tokio_util::sync::CancellationToken;

    fn router(providers: Vec<Arc<MockProvider>>) -> Arc<LlmRouter> {
        let config = RouterConfig::new(ModelChoice::new("a", "a-model")).with_max_retries(0);
        let mut router = LlmRouter::new(config, Arc::new(BreakerRegistry::default())).unwrap();
        for provider in providers {
            router.register(provider);
        }
        Arc::new(router)
    }

    #[test]
    fn test_agreement_edges() {
        assert_eq!(agreement_score(&[]), 0.0);
        assert_eq!(agreement_score(&["anything"]), 1.0);
        assert_eq!(agreement_score(&["Aspirin daily", "aspirin, DAILY."]), 1.0);
        assert_eq!(agreement_score(&["one two", "three four"]), 0.0);
    }

    #[test]
    fn test_agreement_is_mean_of_pairs() {
        // {a b} vs {a c}: 1/3; {a b} vs {a b}: 1; {a c} vs {a b}: 1/3
        let score = agreement_score(&["a b", "a c", "a b"]);
        assert!((score - (1.0 / 3.0 + 1.0 + 1.0 / 3.0) / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_consensus_without_critic() {
        let a = Arc::new(MockProvider::new("a").with_reply(MockReply::text("take with food")));
        let b = Arc::new(MockProvider::new("b").with_reply(MockReply::text("take with water")));
        let c = Arc::new(MockProvider::new("c").with_reply(MockReply::fail("overloaded")));
        let orchestrator = ConsensusOrchestrator::new(router(vec![a, b, c]));

        let choices = [
            ModelChoice::new("a", "a-model"),
            ModelChoice::new("b", "b-model"),
            ModelChoice::new("c", "c-model"),
        ];
        let result = orchestrator
            .run(TaskType::FastQuery, &choices, &LlmRequest::new("how?"))
            .await
            .unwrap();

        assert_eq!(result.responses.len(), 3);
        assert_eq!(result.successful(), 2);
        assert!(!result.responses[2].success);
        assert!((result.agreement - 0.5).abs() < 1e-9);
        assert!(result.critique.is_none());
        assert_eq!(result.final_answer.as_deref(), Some("take with food"));
    }

    #[tokio::test]
    async fn test_critic_synthesizes_answer() {
        let a = Arc::new(MockProvider::new("a").with_reply(MockReply::text("first")));
        let b = Arc::new(MockProvider::new("b").with_reply(MockReply::text("second")));
        let critic = Arc::new(MockProvider::new("critic").with_reply(MockReply::text("merged")));
        let orchestrator = ConsensusOrchestrator::new(router(vec![a, b, critic.clone()]))
            .with_critic(ModelChoice::new("critic", "judge"));

        let choices = [ModelChoice::new("a", "a-model"), ModelChoice::new("b", "b-model")];
        let result = orchestrator
            .run(TaskType::NoteGeneration, &choices, &LlmRequest::new("summarize"))
            .await
            .unwrap();

        assert_eq!(result.final_answer.as_deref(), Some("merged"));
        assert_eq!(critic.calls(), 1);
        assert_eq!(critic.requested_models(), vec!["judge"]);
        assert_eq!(result.agreement, 0.0);
    }

    #[tokio::test]
    async fn test_critic_skipped_without_outputs() {
        let a = Arc::new(MockProvider::new("a").with_reply(MockReply::fail("down")));
        let critic = Arc::new(MockProvider::new("critic"));
        let orchestrator = ConsensusOrchestrator::new(router(vec![a, critic.clone()]))
            .with_critic(ModelChoice::new("critic", "judge"));

        let result = orchestrator
            .run(TaskType::FastQuery, &[ModelChoice::new("a", "a-model")], &LlmRequest::new("q"))
            .await
            .unwrap();

        assert_eq!(result.agreement, 0.0);
        assert!(result.final_answer.is_none());
        assert_eq!(critic.calls(), 0);
    }

    #[tokio::test]
    async fn test_consensus_respects_open_breaker() {
        let breakers = Arc::new(BreakerRegistry::default());
        for _ in 0..5 {
            breakers.get("b").record_failure();
        }
        let a = Arc::new(MockProvider::new("a").with_reply(MockReply::text("fine")));
        let b = Arc::new(MockProvider::new("b"));
        let config = RouterConfig::new(ModelChoice::new("a", "a-model"));
        let router = LlmRouter::new(config, breakers)
            .unwrap()
            .with_provider(a)
            .with_provider(b.clone());
        let orchestrator = ConsensusOrchestrator::new(Arc::new(router));

        let choices = [ModelChoice::new("a", "a-model"), ModelChoice::new("b", "b-model")];
        let result = orchestrator
            .run(TaskType::FastQuery, &choices, &LlmRequest::new("q"))
            .await
            .unwrap();

        assert_eq!(b.calls(), 0);
        assert_eq!(result.successful(), 1);
        assert_eq!(result.agreement, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consensus_cancelled() {
        let a = Arc::new(MockProvider::new("a").with_reply(MockReply::UntilCancelled));
        let orchestrator = ConsensusOrchestrator::new(router(vec![a]));

        let token = CancellationToken::new();
        token.cancel();
        let request = LlmRequest::new("q").with_cancellation(token);
        let result = orchestrator
            .run(TaskType::FastQuery, &[ModelChoice::new("a", "a-model")], &request)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
