//! Configurable pipeline engine.
//!
//! One engine covers every execution mode. A [`PipelineConfig`] is a list of
//! stage definitions (prompt template, target models, fan-out policy); the
//! mode builders produce the sequential, enhanced, anonymous, and swarm
//! layouts from the same parts instead of maintaining parallel engines.
//!
//! Stages execute strictly in order. Each stage's prompt embeds every prior
//! stage's output (truncated to the configured character budget) plus
//! whatever compressed context the session's memory lattice offers. A failed
//! single-target stage aborts the run; fan-out stages tolerate individual
//! candidate failures and fail only when every candidate does. The engine
//! itself never writes to storage - persistence is the caller's business.

use crate::session::SessionHandle;
use crate::thinking::extract_thinking;
use colloquy_core::{
    AgentOutput, AgentRole, ChatMessage, ChatRequest, ColloquyError, ColloquyResult, EngineConfig,
    EntityId, Insight, InsightType, IntentVector, PipelineError, PipelineMode, ProviderError,
};
use colloquy_llm::ProviderRegistry;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Token budget for the lattice context blurb embedded in stage prompts.
const LATTICE_CONTEXT_TOKENS: usize = 400;

/// At most this many key insights are extracted per stage output.
const MAX_KEY_INSIGHTS: usize = 5;

// ============================================================================
// STAGE TEMPLATES
// ============================================================================

const ANALYST_PROMPT: &str = "You are the Analyst in a multi-agent collaboration. Break the \
query down: identify what is being asked, the constraints, and the sub-problems worth \
separating.\n\nQuery: {query}\n\n{context}";

const RESEARCHER_PROMPT: &str = "You are the Researcher in a multi-agent collaboration. Gather \
the facts, figures, and prior art relevant to the query, building on the analysis so far. Cite \
sources where you can.\n\nQuery: {query}\n\n{context}";

const CREATOR_PROMPT: &str = "You are the Creator in a multi-agent collaboration. Using the \
analysis and research below, produce the best candidate answer or artifact for the \
query.\n\nQuery: {query}\n\n{context}";

const CRITIC_PROMPT: &str = "You are the Critic in a multi-agent collaboration. Challenge the \
candidate answer below: find weaknesses, gaps, and risks. Be specific and \
constructive.\n\nQuery: {query}\n\n{context}";

const SYNTHESIZER_PROMPT: &str = "You are the Synthesizer in a multi-agent collaboration. Merge \
the analysis, research, candidate answer, and critique below into one final, polished \
response to the query.\n\nQuery: {query}\n\n{context}";

const ENHANCED_PREFIX: &str = "Begin your response with a section opening with \"Thinking:\" \
that records your reasoning, followed by a blank line and your answer.\n\n";

fn template_for(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Analyst => ANALYST_PROMPT,
        AgentRole::Researcher => RESEARCHER_PROMPT,
        AgentRole::Creator => CREATOR_PROMPT,
        AgentRole::Critic => CRITIC_PROMPT,
        AgentRole::Synthesizer => SYNTHESIZER_PROMPT,
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// One (provider, model) pair a stage calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTarget {
    pub provider: String,
    pub model: String,
}

impl StageTarget {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// How a stage treats its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutPolicy {
    /// One call; any failure aborts the run
    Single,
    /// Parallel candidates; the best by heuristic score wins. Fails only
    /// when every candidate fails.
    ScoreSelect,
    /// Parallel contributors merged into one labeled digest. Fails only
    /// when every contributor fails.
    Gather,
}

/// One stage of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDefinition {
    pub role: AgentRole,
    /// Prompt template with `{query}` and `{context}` placeholders
    pub prompt: String,
    pub targets: Vec<StageTarget>,
    pub fanout: FanoutPolicy,
}

impl StageDefinition {
    pub fn single(role: AgentRole, target: StageTarget) -> Self {
        Self {
            role,
            prompt: template_for(role).to_string(),
            targets: vec![target],
            fanout: FanoutPolicy::Single,
        }
    }
}

/// A full pipeline layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub mode: PipelineMode,
    pub stages: Vec<StageDefinition>,
    /// Hide provider/model identity behind generic contributor labels
    pub anonymize: bool,
}

impl PipelineConfig {
    /// The fixed five-stage sequential chain, every stage on one target.
    pub fn sequential(default: StageTarget) -> Self {
        Self {
            mode: PipelineMode::Sequential,
            stages: AgentRole::chain()
                .into_iter()
                .map(|role| StageDefinition::single(role, default.clone()))
                .collect(),
            anonymize: false,
        }
    }

    /// Sequential chain whose prompts request an explicit thinking section.
    pub fn enhanced(default: StageTarget) -> Self {
        let mut config = Self::sequential(default);
        config.mode = PipelineMode::Enhanced;
        for stage in &mut config.stages {
            stage.prompt = format!("{}{}", ENHANCED_PREFIX, stage.prompt);
        }
        config
    }

    /// Sequential chain with an anonymized, score-selected synthesis stage:
    /// `candidates` parallel synthesis attempts drawn round-robin from
    /// `pool`, best one wins.
    pub fn anonymous(pool: Vec<StageTarget>, candidates: usize) -> Self {
        let first = pool.first().cloned().unwrap_or_else(|| {
            StageTarget::new("openai", "gpt-4o")
        });
        let pool = if pool.is_empty() { vec![first.clone()] } else { pool };
        let mut config = Self::sequential(first);
        config.mode = PipelineMode::Anonymous;
        config.anonymize = true;

        if let Some(synthesis) = config.stages.last_mut() {
            synthesis.fanout = FanoutPolicy::ScoreSelect;
            synthesis.targets = (0..candidates.max(1))
                .map(|i| pool[i % pool.len()].clone())
                .collect();
        }
        config
    }

    /// Fan-out/fan-in: the research and creation phases gather every model
    /// in the pool; framing and synthesis stay single-target.
    pub fn swarm(pool: Vec<StageTarget>) -> Self {
        let first = pool.first().cloned().unwrap_or_else(|| {
            StageTarget::new("openai", "gpt-4o")
        });
        let mut config = Self::sequential(first);
        config.mode = PipelineMode::Swarm;

        for stage in &mut config.stages {
            if matches!(stage.role, AgentRole::Researcher | AgentRole::Creator) {
                stage.fanout = FanoutPolicy::Gather;
                stage.targets = pool.clone();
            }
        }
        config
    }

    /// Build the layout for a mode from a target pool.
    pub fn for_mode(mode: PipelineMode, pool: Vec<StageTarget>, engine: &EngineConfig) -> Self {
        let first = pool.first().cloned().unwrap_or_else(|| {
            StageTarget::new("openai", "gpt-4o")
        });
        match mode {
            PipelineMode::Sequential => Self::sequential(first),
            PipelineMode::Enhanced => Self::enhanced(first),
            PipelineMode::Anonymous => Self::anonymous(pool, engine.anonymous_candidates),
            PipelineMode::Swarm => Self::swarm(pool),
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    /// The last stage's output
    pub final_output: String,
    pub stage_outputs: Vec<AgentOutput>,
    pub total_time_ms: f64,
}

/// Executes pipeline configurations against the provider registry.
pub struct PipelineEngine {
    registry: Arc<ProviderRegistry>,
    config: EngineConfig,
}

impl PipelineEngine {
    pub fn new(registry: Arc<ProviderRegistry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Run a pipeline to completion.
    ///
    /// When a session is supplied, stage prompts embed the lattice's
    /// compressed context and each stage's key insights feed back into it.
    /// A stage failure aborts the run with [`PipelineError::StageFailed`];
    /// already-completed stage outputs are not returned on failure, so a
    /// caller that needs them must capture the error payload instead.
    pub async fn run(
        &self,
        query: &str,
        turn_id: EntityId,
        pipeline: &PipelineConfig,
        intent: &IntentVector,
        session: Option<&SessionHandle>,
    ) -> ColloquyResult<PipelineRun> {
        if pipeline.stages.is_empty() {
            return Err(PipelineError::EmptyPipeline.into());
        }

        let started = Instant::now();
        let mut stage_outputs: Vec<AgentOutput> = Vec::with_capacity(pipeline.stages.len());

        for (index, stage) in pipeline.stages.iter().enumerate() {
            let span = tracing::info_span!("pipeline_stage", stage = index, role = %stage.role);

            let (provider, model, raw_content) = async {
                let context = self
                    .build_context(query, intent, &stage_outputs, pipeline.anonymize, session)
                    .await;
                let prompt = stage
                    .prompt
                    .replace("{query}", query)
                    .replace("{context}", &context);

                match stage.fanout {
                    FanoutPolicy::Single => self.run_single(index, stage, &prompt).await,
                    FanoutPolicy::ScoreSelect => {
                        self.run_score_select(index, stage, query, &prompt).await
                    }
                    FanoutPolicy::Gather => {
                        self.run_gather(index, stage, pipeline.anonymize, &prompt).await
                    }
                }
            }
            .instrument(span)
            .await?;

            let (thinking, content) = if pipeline.mode == PipelineMode::Enhanced {
                match extract_thinking(&raw_content) {
                    Some((thinking, answer)) => (Some(thinking), answer),
                    None => (None, raw_content),
                }
            } else {
                (None, raw_content)
            };

            let key_insights = extract_key_insights(&content);
            if let Some(session) = session {
                let mut state = session.write().await;
                for insight in &key_insights {
                    state.lattice.add_insight(Insight::new(
                        insight.clone(),
                        insight_type_for(stage.role),
                        model.clone(),
                        0.6,
                        intent.active_needs(0.1).into_iter().map(|(i, _)| i).collect(),
                    ));
                }
            }

            tracing::info!(role = %stage.role, %provider, %model, "stage done");
            stage_outputs.push(AgentOutput {
                role: stage.role,
                provider,
                model,
                content,
                thinking,
                key_insights,
                timestamp: chrono::Utc::now(),
                turn_id,
            });
        }

        let final_output = stage_outputs
            .last()
            .map(|o| o.content.clone())
            .unwrap_or_default();

        Ok(PipelineRun {
            final_output,
            stage_outputs,
            total_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    async fn call_target(
        &self,
        target: &StageTarget,
        prompt: &str,
    ) -> ColloquyResult<String> {
        let provider = self.registry.get(&target.provider)?;
        let request = ChatRequest::new(target.model.clone(), vec![ChatMessage::user(prompt)]);
        let response = provider.chat(&request).await?;
        Ok(response.content)
    }

    async fn run_single(
        &self,
        index: usize,
        stage: &StageDefinition,
        prompt: &str,
    ) -> ColloquyResult<(String, String, String)> {
        let target = stage
            .targets
            .first()
            .ok_or(PipelineError::EmptyPipeline)?;

        match self.call_target(target, prompt).await {
            Ok(content) => Ok((target.provider.clone(), target.model.clone(), content)),
            Err(err) => Err(PipelineError::StageFailed {
                stage: index,
                role: stage.role.to_string(),
                provider: target.provider.clone(),
                error_type: classify_error(&err),
                message: err.to_string(),
            }
            .into()),
        }
    }

    async fn run_score_select(
        &self,
        index: usize,
        stage: &StageDefinition,
        query: &str,
        prompt: &str,
    ) -> ColloquyResult<(String, String, String)> {
        let calls = stage
            .targets
            .iter()
            .map(|target| async move {
                self.call_target(target, prompt)
                    .await
                    .map(|content| (target.clone(), content))
            });
        let results = join_all(calls).await;

        let total = results.len();
        let mut best: Option<(f32, StageTarget, String)> = None;
        for result in results {
            match result {
                Ok((target, content)) => {
                    let score = score_candidate(query, &content);
                    if best.as_ref().map(|(s, _, _)| score > *s).unwrap_or(true) {
                        best = Some((score, target, content));
                    }
                }
                Err(err) => {
                    tracing::warn!(stage = index, %err, "synthesis candidate failed");
                }
            }
        }

        match best {
            Some((score, target, content)) => {
                tracing::debug!(stage = index, score, winner = %target.model, "candidate selected");
                Ok((target.provider, target.model, content))
            }
            None => Err(PipelineError::AllCandidatesFailed {
                stage: index,
                count: total,
            }
            .into()),
        }
    }

    async fn run_gather(
        &self,
        index: usize,
        stage: &StageDefinition,
        anonymize: bool,
        prompt: &str,
    ) -> ColloquyResult<(String, String, String)> {
        let calls = stage
            .targets
            .iter()
            .map(|target| async move {
                self.call_target(target, prompt)
                    .await
                    .map(|content| (target.clone(), content))
            });
        let results = join_all(calls).await;

        let total = results.len();
        let succeeded: Vec<(StageTarget, String)> = results
            .into_iter()
            .filter_map(|result| match result {
                Ok(pair) => Some(pair),
                Err(err) => {
                    tracing::warn!(stage = index, %err, "swarm contributor failed");
                    None
                }
            })
            .collect();

        if succeeded.is_empty() {
            return Err(PipelineError::AllCandidatesFailed {
                stage: index,
                count: total,
            }
            .into());
        }

        let digest = succeeded
            .iter()
            .enumerate()
            .map(|(i, (target, content))| {
                let label = contributor_label(anonymize, i, target);
                format!("### {}\n{}", label, content)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let (first, _) = &succeeded[0];
        Ok((first.provider.clone(), first.model.clone(), digest))
    }

    /// Prior stage outputs, each truncated to the character budget, plus
    /// the lattice's compressed context when a session is attached.
    async fn build_context(
        &self,
        query: &str,
        intent: &IntentVector,
        prior: &[AgentOutput],
        anonymize: bool,
        session: Option<&SessionHandle>,
    ) -> String {
        let mut sections = Vec::new();

        if let Some(session) = session {
            let state = session.read().await;
            let lattice_context =
                state
                    .lattice
                    .get_relevant_context(query, intent, LATTICE_CONTEXT_TOKENS);
            if !lattice_context.is_empty() {
                sections.push(format!("Shared memory:\n{}", lattice_context));
            }
        }

        for (i, output) in prior.iter().enumerate() {
            let label = if anonymize {
                format!("{} ({})", output.role, anonymous_label(i))
            } else {
                format!("{} ({}/{})", output.role, output.provider, output.model)
            };
            let body = truncate_chars(&output.content, self.config.stage_context_budget_chars);
            sections.push(format!("{}:\n{}", label, body));
        }

        if sections.is_empty() {
            String::new()
        } else {
            sections.join("\n\n")
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn anonymous_label(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    format!("Contributor {}", letter)
}

fn contributor_label(anonymize: bool, index: usize, target: &StageTarget) -> String {
    if anonymize {
        anonymous_label(index)
    } else {
        format!("{}/{}", target.provider, target.model)
    }
}

/// Truncate to a character budget on a char boundary.
fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    text.chars().take(budget).collect()
}

/// Weighted four-part heuristic for ranking synthesis candidates:
/// completeness, structure, relevance to the query, and specificity.
fn score_candidate(query: &str, content: &str) -> f32 {
    let words: Vec<&str> = content.split_whitespace().collect();

    let completeness = (words.len() as f32 / 300.0).min(1.0);

    let mut structure = 0.0f32;
    if content.split("\n\n").count() > 1 {
        structure += 0.5;
    }
    if content.lines().any(|l| l.trim_start().starts_with("- ")) {
        structure += 0.3;
    }
    if content.lines().any(|l| l.trim_start().starts_with('#')) {
        structure += 0.2;
    }
    let structure = structure.min(1.0);

    let query_words: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(str::to_string)
        .collect();
    let lowered = content.to_lowercase();
    let relevance = if query_words.is_empty() {
        0.5
    } else {
        query_words.iter().filter(|w| lowered.contains(w.as_str())).count() as f32
            / query_words.len() as f32
    };

    let specifics = words
        .iter()
        .filter(|w| w.chars().any(|c| c.is_ascii_digit()) || w.chars().next().is_some_and(|c| c.is_uppercase()))
        .count();
    let specificity = (specifics as f32 / 20.0).min(1.0);

    0.3 * completeness + 0.2 * structure + 0.3 * relevance + 0.2 * specificity
}

/// Bullet and numbered lines long enough to stand alone.
fn extract_key_insights(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let stripped = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .or_else(|| {
                    trimmed
                        .find(". ")
                        .filter(|pos| trimmed[..*pos].chars().all(|c| c.is_ascii_digit()))
                        .map(|pos| &trimmed[pos + 2..])
                })?;
            let stripped = stripped.trim();
            (stripped.len() >= 20).then(|| stripped.to_string())
        })
        .take(MAX_KEY_INSIGHTS)
        .collect()
}

fn insight_type_for(role: AgentRole) -> InsightType {
    match role {
        AgentRole::Analyst => InsightType::Hypothesis,
        AgentRole::Researcher => InsightType::Fact,
        AgentRole::Creator => InsightType::Pattern,
        AgentRole::Critic => InsightType::Warning,
        AgentRole::Synthesizer => InsightType::Fact,
    }
}

/// Short machine-readable kind for a stage error.
fn classify_error(err: &ColloquyError) -> String {
    match err {
        ColloquyError::Provider(provider_err) => match provider_err {
            ProviderError::NotRegistered { .. } => "not_registered",
            ProviderError::MissingApiKey { .. } => "missing_api_key",
            ProviderError::RequestFailed { .. } => "request_failed",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::InvalidResponse { .. } => "invalid_response",
            ProviderError::StreamInterrupted { .. } => "stream_interrupted",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::LadderExhausted { .. } => "ladder_exhausted",
        }
        .to_string(),
        ColloquyError::Routing(_) => "routing".to_string(),
        ColloquyError::Pipeline(_) => "pipeline".to_string(),
        ColloquyError::Lattice(_) => "lattice".to_string(),
        ColloquyError::Orchestrator(_) => "orchestrator".to_string(),
        ColloquyError::Storage(_) => "storage".to_string(),
        ColloquyError::Config(_) => "config".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use async_trait::async_trait;
    use colloquy_llm::{ChatProvider, EventStream, MockChatProvider};
    use colloquy_core::{new_entity_id, ProviderResponse};
    use std::sync::Mutex;

    fn engine_with(providers: Vec<MockChatProvider>) -> PipelineEngine {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(Arc::new(provider));
        }
        PipelineEngine::new(Arc::new(registry), EngineConfig::default())
    }

    fn target(provider: &str) -> StageTarget {
        StageTarget::new(provider, "mock-model")
    }

    #[tokio::test]
    async fn test_sequential_runs_all_five_stages() {
        let responses: Vec<String> = (1..=5).map(|i| format!("stage {} output", i)).collect();
        let engine = engine_with(vec![MockChatProvider::new("openai", responses)]);
        let pipeline = PipelineConfig::sequential(target("openai"));

        let run = engine
            .run("q", new_entity_id(), &pipeline, &IntentVector::default(), None)
            .await
            .expect("run");

        assert_eq!(run.stage_outputs.len(), 5);
        assert_eq!(run.final_output, "stage 5 output");
        assert_eq!(run.stage_outputs[0].role, AgentRole::Analyst);
        assert_eq!(run.stage_outputs[4].role, AgentRole::Synthesizer);
        assert!(run.total_time_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_stage_failure_aborts_run() {
        let responses: Vec<String> = (1..=5).map(|i| format!("stage {}", i)).collect();
        let engine = engine_with(vec![
            MockChatProvider::new("openai", responses).failing_on(vec![2])
        ]);
        let pipeline = PipelineConfig::sequential(target("openai"));

        let err = engine
            .run("q", new_entity_id(), &pipeline, &IntentVector::default(), None)
            .await
            .unwrap_err();

        match err {
            ColloquyError::Pipeline(PipelineError::StageFailed {
                stage,
                role,
                provider,
                error_type,
                message,
            }) => {
                assert_eq!(stage, 2);
                assert_eq!(role, "creator");
                assert_eq!(provider, "openai");
                assert_eq!(error_type, "request_failed");
                assert!(message.contains("scripted failure"));
            }
            other => panic!("expected StageFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_pipeline_rejected() {
        let engine = engine_with(vec![]);
        let pipeline = PipelineConfig {
            mode: PipelineMode::Sequential,
            stages: Vec::new(),
            anonymize: false,
        };
        let err = engine
            .run("q", new_entity_id(), &pipeline, &IntentVector::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ColloquyError::Pipeline(PipelineError::EmptyPipeline)
        ));
    }

    #[tokio::test]
    async fn test_anonymous_synthesis_survives_candidate_failure() {
        // Four pre-synthesis stages, then three parallel candidates; one of
        // the seven calls fails, the run still completes.
        let responses: Vec<String> = (1..=7).map(|i| format!("output number {}", i)).collect();
        let engine = engine_with(vec![
            MockChatProvider::new("openai", responses).failing_on(vec![4])
        ]);
        let pipeline = PipelineConfig::anonymous(vec![target("openai")], 3);

        let run = engine
            .run("q", new_entity_id(), &pipeline, &IntentVector::default(), None)
            .await
            .expect("run");
        assert_eq!(run.stage_outputs.len(), 5);
    }

    #[tokio::test]
    async fn test_all_candidates_failing_fails_stage() {
        let engine = engine_with(vec![MockChatProvider::always_failing("openai")]);
        let mut pipeline = PipelineConfig::anonymous(vec![target("openai")], 3);
        // Strip the leading stages so only the fan-out stage runs.
        pipeline.stages.drain(..4);

        let err = engine
            .run("q", new_entity_id(), &pipeline, &IntentVector::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ColloquyError::Pipeline(PipelineError::AllCandidatesFailed { count: 3, .. })
        ));
    }

    /// Records every prompt it receives.
    struct RecordingProvider {
        id: String,
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingProvider {
        fn new(id: &str, reply: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatProvider for RecordingProvider {
        fn provider_id(&self) -> &str {
            &self.id
        }

        fn default_model(&self) -> &str {
            "recording-model"
        }

        async fn chat(&self, request: &ChatRequest) -> ColloquyResult<ProviderResponse> {
            let prompt = request
                .messages
                .iter()
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
                .join("\n");
            self.prompts.lock().unwrap().push(prompt);
            Ok(ProviderResponse::text(self.reply.clone(), 1.0))
        }

        async fn chat_stream(&self, _request: &ChatRequest) -> ColloquyResult<EventStream> {
            Ok(Box::pin(futures_util::stream::empty()))
        }
    }

    #[tokio::test]
    async fn test_prior_output_truncated_in_context() {
        let long_reply = "x".repeat(5000);
        let provider = RecordingProvider::new("openai", &long_reply);

        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        let mut config = EngineConfig::default();
        config.stage_context_budget_chars = 100;
        let engine = PipelineEngine::new(Arc::new(registry), config);

        let mut pipeline = PipelineConfig::sequential(target("openai"));
        pipeline.stages.truncate(2);

        engine
            .run("q", new_entity_id(), &pipeline, &IntentVector::default(), None)
            .await
            .expect("run");

        let prompts = provider.prompts.lock().unwrap();
        // The second stage's prompt embeds the first stage's output,
        // truncated well below its 5000 chars.
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].len() < 1000);
        assert!(prompts[1].contains("analyst (openai/mock-model)"));
    }

    #[tokio::test]
    async fn test_anonymized_context_hides_model_identity() {
        let provider = RecordingProvider::new("openai", "a perfectly fine answer");
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        let engine = PipelineEngine::new(Arc::new(registry), EngineConfig::default());

        let mut pipeline = PipelineConfig::anonymous(vec![target("openai")], 2);
        pipeline.stages.truncate(2);

        engine
            .run("q", new_entity_id(), &pipeline, &IntentVector::default(), None)
            .await
            .expect("run");

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[1].contains("Contributor A"));
        assert!(!prompts[1].contains("mock-model"));
    }

    #[tokio::test]
    async fn test_enhanced_mode_extracts_thinking() {
        let reply = "Thinking: weigh the tradeoffs first.\n\nUse a ring buffer.";
        let responses = vec![reply.to_string(); 5];
        let engine = engine_with(vec![MockChatProvider::new("openai", responses)]);
        let pipeline = PipelineConfig::enhanced(target("openai"));

        let run = engine
            .run("q", new_entity_id(), &pipeline, &IntentVector::default(), None)
            .await
            .expect("run");

        let first = &run.stage_outputs[0];
        assert_eq!(first.thinking.as_deref(), Some("weigh the tradeoffs first."));
        assert_eq!(first.content, "Use a ring buffer.");
    }

    #[tokio::test]
    async fn test_swarm_gathers_contributors() {
        let engine = engine_with(vec![
            MockChatProvider::new("openai", vec!["from openai".to_string(); 5]),
            MockChatProvider::new("gemini", vec!["from gemini".to_string(); 5]),
        ]);
        let pipeline = PipelineConfig::swarm(vec![target("openai"), target("gemini")]);

        let run = engine
            .run("q", new_entity_id(), &pipeline, &IntentVector::default(), None)
            .await
            .expect("run");

        let researcher = &run.stage_outputs[1];
        assert_eq!(researcher.role, AgentRole::Researcher);
        assert!(researcher.content.contains("from openai"));
        assert!(researcher.content.contains("from gemini"));
    }

    #[tokio::test]
    async fn test_stage_insights_feed_session_lattice() {
        let reply = "Findings:\n- the cache invalidation path misses tombstones entirely\n- \
                     replica lag exceeds the configured ceiling under load";
        let responses = vec![reply.to_string(); 5];
        let engine = engine_with(vec![MockChatProvider::new("openai", responses)]);
        let pipeline = PipelineConfig::sequential(target("openai"));

        let store = SessionStore::new(EngineConfig::default());
        let session = store.get("thread-1");

        let run = engine
            .run(
                "q",
                new_entity_id(),
                &pipeline,
                &IntentVector::default(),
                Some(&session),
            )
            .await
            .expect("run");

        assert_eq!(run.stage_outputs[0].key_insights.len(), 2);
        let state = session.read().await;
        assert!(!state.lattice.is_empty());
    }

    #[test]
    fn test_score_candidate_prefers_structured_relevant_output() {
        let query = "design a caching layer";
        let weak = "ok";
        let strong = "A caching layer design.\n\n- Use an LRU eviction policy for the caching \
                      tier\n- Size the layer at 2048 entries\n\nThe design covers invalidation.";
        assert!(score_candidate(query, strong) > score_candidate(query, weak));
    }

    #[test]
    fn test_extract_key_insights_caps_and_filters() {
        let content = "intro\n- short\n- this bullet is long enough to count as an insight\n\
                       1. a numbered insight that is also long enough\nplain line";
        let insights = extract_key_insights(content);
        assert_eq!(insights.len(), 2);
        assert!(insights[0].starts_with("this bullet"));
    }

    #[test]
    fn test_for_mode_layouts() {
        let engine_config = EngineConfig::default();
        let pool = vec![target("openai"), target("gemini")];

        let sequential =
            PipelineConfig::for_mode(PipelineMode::Sequential, pool.clone(), &engine_config);
        assert!(sequential.stages.iter().all(|s| s.fanout == FanoutPolicy::Single));

        let anonymous =
            PipelineConfig::for_mode(PipelineMode::Anonymous, pool.clone(), &engine_config);
        assert!(anonymous.anonymize);
        assert_eq!(anonymous.stages.last().unwrap().targets.len(), 3);
        assert_eq!(anonymous.stages.last().unwrap().fanout, FanoutPolicy::ScoreSelect);

        let swarm = PipelineConfig::for_mode(PipelineMode::Swarm, pool, &engine_config);
        assert_eq!(swarm.stages[1].fanout, FanoutPolicy::Gather);
        assert_eq!(swarm.stages[1].targets.len(), 2);
    }
}
