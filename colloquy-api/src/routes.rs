//! HTTP route handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::*;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use colloquy_core::{
    CollabMessage, CollabRun, CollabStep, ColloquyError, Conversation, EntityId, MessageRole,
    PipelineError, PipelineMode, RunStatus, StepFailure, StepStatus,
};
use colloquy_engine::{CoreferenceRewriter, PipelineConfig, StageTarget};
use axum::http::HeaderValue;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// How many prior messages feed the classifier's context.
const CLASSIFIER_CONTEXT_MESSAGES: usize = 5;

/// Candidate models requested from the router per run.
const MAX_ROUTED_MODELS: usize = 3;

/// Reward recorded for a model whose stage completed.
const SUCCESS_REWARD: f32 = 0.8;

/// Build the API router.
pub fn api_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.cors_origins);
    Router::new()
        .route("/health", get(health))
        .route("/collaborate", post(collaborate))
        .route("/follow-up", post(follow_up))
        .route("/meta-question", post(meta_question))
        .route("/threads/:id/agent-outputs", get(thread_agent_outputs))
        .route("/threads/:id/stats", get(thread_stats))
        .route("/turns/:id", get(turn))
        .route("/stats", get(global_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// An empty origin list allows everything; otherwise only the listed
/// origins are admitted.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        providers: state.registry.provider_ids(),
    })
}

// ============================================================================
// COLLABORATION
// ============================================================================

async fn collaborate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CollaborateRequest>,
) -> ApiResult<Json<CollaborateResponse>> {
    let message = validated_message(&request.message)?;
    let mode = parse_mode(request.mode.as_deref(), state.default_mode)?;

    let conversation = match request.conversation_id {
        Some(id) => state.storage.get_conversation(id).await?,
        None => {
            let conversation = Conversation::new(None);
            state.storage.create_conversation(&conversation).await?;
            conversation
        }
    };

    run_collaboration(&state, &conversation, &message, mode)
        .await
        .map(Json)
}

async fn follow_up(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FollowUpRequest>,
) -> ApiResult<Json<CollaborateResponse>> {
    let message = validated_message(&request.message)?;
    let mode = parse_mode(request.mode.as_deref(), state.default_mode)?;

    // Follow-ups only ever continue an existing thread.
    let conversation = state.storage.get_conversation(request.conversation_id).await?;

    run_collaboration(&state, &conversation, &message, mode)
        .await
        .map(Json)
}

/// The whole request flow: coreference rewrite, classify, route, run the
/// pipeline, persist every step, and settle the run record.
async fn run_collaboration(
    state: &Arc<AppState>,
    conversation: &Conversation,
    message: &str,
    mode: PipelineMode,
) -> ApiResult<CollaborateResponse> {
    let session = state.sessions.get(&conversation.id.to_string());

    // Resolve references against entities from earlier turns.
    let rewrite = {
        let session_state = session.read().await;
        CoreferenceRewriter::new().rewrite(message, &session_state.entities)
    };

    if rewrite.ambiguous {
        let user_message = CollabMessage::new(conversation.id, MessageRole::User, message);
        state.storage.insert_message(&user_message).await?;

        let disambiguation = rewrite.disambiguation.expect("ambiguous result has question");
        return Ok(CollaborateResponse {
            conversation_id: conversation.id,
            run_id: None,
            final_output: None,
            steps: Vec::new(),
            total_time_ms: None,
            rewritten_message: None,
            clarification: Some(ClarificationResponse {
                question: disambiguation.question,
                options: disambiguation.options,
            }),
        });
    }

    let rewritten = rewrite.rewritten.clone();
    {
        let mut session_state = session.write().await;
        session_state.entities.observe_text(&rewritten);
    }

    // Prior turns give the classifier its context signal.
    let history = state.storage.list_messages(conversation.id).await?;
    let context: String = history
        .iter()
        .rev()
        .take(CLASSIFIER_CONTEXT_MESSAGES)
        .map(|m| m.content.clone())
        .collect::<Vec<_>>()
        .join("\n");

    let user_message = CollabMessage::new(conversation.id, MessageRole::User, message);
    state.storage.insert_message(&user_message).await?;

    let intent = state
        .classifier
        .classify(&rewritten, (!context.is_empty()).then_some(context.as_str()));

    let available = state.available_models();
    let rewards = session.read().await.rewards.clone();
    let ranked = state
        .router
        .route(&intent, &available, MAX_ROUTED_MODELS, Some(&rewards));

    let pool: Vec<StageTarget> = if ranked.is_empty() {
        let fallback = state.default_target()?;
        tracing::debug!(model = %fallback.id, "routing produced no candidate, using default");
        vec![StageTarget::new(fallback.provider, fallback.id)]
    } else {
        ranked
            .iter()
            .map(|c| StageTarget::new(c.provider.clone(), c.model_id.clone()))
            .collect()
    };

    let pipeline = PipelineConfig::for_mode(mode, pool, &state.engine_config);

    let mut run = CollabRun::new(conversation.id, user_message.id, mode);
    state.storage.insert_run(&run).await?;
    run.status = RunStatus::Running;
    state.storage.update_run(&run).await?;

    let outcome = state
        .engine
        .run(&rewritten, user_message.id, &pipeline, &intent, Some(&session))
        .await;

    match outcome {
        Ok(result) => {
            let budget = state.engine_config.stage_context_budget_chars;
            for (position, output) in result.stage_outputs.iter().enumerate() {
                let mut agent_message =
                    CollabMessage::new(conversation.id, MessageRole::Agent, &output.content)
                        .with_agent_role(output.role);
                agent_message.created_at = output.timestamp;
                state.storage.insert_message(&agent_message).await?;

                let mut step = CollabStep::new(
                    run.id,
                    position as i32,
                    output.role,
                    &output.provider,
                    &output.model,
                );
                step.status = StepStatus::Done;
                step.content = Some(output.content.chars().take(budget).collect());
                step.message_id = Some(agent_message.id);
                state.storage.insert_step(&step).await?;
            }

            run.status = RunStatus::Done;
            run.final_output = Some(result.final_output.clone());
            run.total_time_ms = Some(result.total_time_ms);
            run.finished_at = Some(Utc::now());
            state.storage.update_run(&run).await?;
            state.storage.touch_conversation(conversation.id).await?;

            {
                let mut session_state = session.write().await;
                for output in &result.stage_outputs {
                    session_state.rewards.record(output.model.clone(), SUCCESS_REWARD);
                }
            }

            let steps = state.storage.list_steps(run.id).await?;
            Ok(CollaborateResponse {
                conversation_id: conversation.id,
                run_id: Some(run.id),
                final_output: Some(result.final_output),
                steps: steps.iter().map(AgentOutputResponse::from).collect(),
                total_time_ms: Some(result.total_time_ms),
                rewritten_message: (rewritten != message).then_some(rewritten),
                clarification: None,
            })
        }
        Err(err) => {
            let failure = step_failure_of(&err);
            if let ColloquyError::Pipeline(PipelineError::StageFailed { stage, role, .. }) = &err {
                if let Ok(agent_role) = colloquy_core::AgentRole::from_str(role) {
                    let mut step = CollabStep::new(
                        run.id,
                        *stage as i32,
                        agent_role,
                        &failure.provider,
                        "",
                    );
                    step.status = StepStatus::Error;
                    step.error = Some(failure.clone());
                    state.storage.insert_step(&step).await?;
                }
            }

            run.status = RunStatus::Error;
            run.error = Some(failure);
            run.finished_at = Some(Utc::now());
            state.storage.update_run(&run).await?;

            Err(err.into())
        }
    }
}

/// Capture `{message, type, provider}` for the run record.
fn step_failure_of(err: &ColloquyError) -> StepFailure {
    match err {
        ColloquyError::Pipeline(PipelineError::StageFailed {
            provider,
            error_type,
            message,
            ..
        }) => StepFailure {
            message: message.clone(),
            error_type: error_type.clone(),
            provider: provider.clone(),
        },
        other => StepFailure {
            message: other.to_string(),
            error_type: "internal".to_string(),
            provider: String::new(),
        },
    }
}

// ============================================================================
// META-QUESTIONS
// ============================================================================

async fn meta_question(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MetaQuestionRequest>,
) -> ApiResult<Json<MetaQuestionResponse>> {
    if request.question.trim().is_empty() {
        return Err(ApiError::invalid_input("question must not be empty"));
    }

    let stats = state.storage.thread_stats(request.conversation_id).await?;
    let runs = state.storage.list_runs(request.conversation_id).await?;

    let mut answer = format!(
        "This thread holds {} messages across {} collaboration runs ({} completed, {} failed).",
        stats.message_count, stats.run_count, stats.completed_runs, stats.error_runs
    );
    if let Some(avg) = stats.avg_run_time_ms {
        answer.push_str(&format!(" Completed runs averaged {:.0} ms.", avg));
    }
    if let Some(last) = runs.last() {
        answer.push_str(&format!(
            " The most recent run used the {} pipeline and is {}.",
            last.mode, last.status
        ));
    }

    Ok(Json(MetaQuestionResponse {
        answer,
        stats: ThreadStatsResponse::from(&stats),
    }))
}

// ============================================================================
// READ PATHS
// ============================================================================

async fn thread_agent_outputs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<Vec<AgentOutputResponse>>> {
    // 404 for unknown threads rather than an empty list.
    state.storage.get_conversation(id).await?;
    let steps = state.storage.list_agent_steps(id).await?;
    Ok(Json(steps.iter().map(AgentOutputResponse::from).collect()))
}

async fn thread_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<ThreadStatsResponse>> {
    let stats = state.storage.thread_stats(id).await?;
    Ok(Json(ThreadStatsResponse::from(&stats)))
}

async fn turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<TurnResponse>> {
    let turn = state.storage.get_turn(id).await?;
    Ok(Json(TurnResponse::from(&turn)))
}

async fn global_stats(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<GlobalStatsResponse>> {
    let stats = state.storage.global_stats().await?;
    Ok(Json(GlobalStatsResponse::from(stats)))
}

// ============================================================================
// HELPERS
// ============================================================================

fn validated_message(message: &str) -> ApiResult<String> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid_input("message must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn parse_mode(mode: Option<&str>, default: PipelineMode) -> ApiResult<PipelineMode> {
    match mode {
        None => Ok(default),
        Some(raw) => PipelineMode::from_db_str(raw)
            .map_err(|_| ApiError::invalid_input(format!("unknown pipeline mode: {}", raw))),
    }
}
