//! `POST /v1/chat/completions` — the hot path.
//!
//! Per request: validate, resolve the model (before any session
//! mutation), serialize on the per-session lock, adopt the incoming
//! transcript as the session history, reduce when over budget, dispatch
//! upstream, and emit either the buffered body or an SSE passthrough.
//! The assistant turn is written back after the response; a failed
//! post-response write is logged, never surfaced.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tokio::sync::OwnedSemaphorePermit;

use mr_context::{apply_strategy, should_reduce};
use mr_domain::chat::{estimate_tokens, Message, Session};
use mr_domain::error::Error;
use mr_domain::stream::{ChunkEvent, Usage};
use mr_domain::trace::TraceEvent;
use mr_providers::wire::RequestParams;
use mr_providers::{ChatCompletionRequest, Resolution};

use crate::error::ApiError;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_completions(
    State(state): State<AppState>,
    body: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return ApiError::invalid_request(rejection.body_text()).into_response();
        }
    };
    if let Err(e) = request.validate() {
        return ApiError::from_domain(&e).into_response();
    }

    let correlation_id = format!("req-{}", uuid::Uuid::new_v4());
    let user_id = request.user.clone().unwrap_or_else(|| "anonymous".into());
    let session_key = state.key_policy.derive(&user_id);

    TraceEvent::ApiCall {
        correlation_id: correlation_id.clone(),
        session_key: session_key.clone(),
        model: request.model.clone(),
        stream: request.stream,
        message_count: request.messages.len(),
    }
    .emit();

    // Resolve before touching the session: an unknown model must leave
    // no trace in the store and trigger no upstream call.
    let resolution = match state.router.resolve(&request.model) {
        Ok(resolution) => resolution,
        Err(e) => return ApiError::from_domain(&e).into_response(),
    };

    let incoming = match request.to_messages() {
        Ok(messages) => messages,
        Err(e) => return ApiError::from_domain(&e).into_response(),
    };

    // One turn at a time per session.
    let permit = match state.session_locks.acquire(&session_key).await {
        Ok(permit) => permit,
        Err(e) => return ApiError::from_domain(&e).into_response(),
    };

    // Session policy: replace. Clients re-send the full transcript, so
    // the incoming messages become the history; the delta is computed
    // only for observability.
    let prior = match state.store.get(&session_key).await {
        Ok(prior) => prior,
        Err(e) => return ApiError::from_domain(&e).into_response(),
    };
    let delta = new_message_delta(
        prior.as_ref().map(|s| s.history.messages()).unwrap_or(&[]),
        &incoming,
    );
    tracing::debug!(
        session_key = %session_key,
        incoming = incoming.len(),
        new_messages = delta,
        "session history adopted from request"
    );

    let mut session = match state
        .store
        .replace_history(&session_key, &user_id, incoming)
        .await
    {
        Ok(session) => session,
        Err(e) => return ApiError::from_domain(&e).into_response(),
    };

    // Context reduction, persisted before dispatch.
    if should_reduce(&session.history, &resolution.context) {
        if let Err(e) = reduce_session(
            &state,
            &mut session,
            &session_key,
            &resolution,
            &correlation_id,
        )
        .await
        {
            return ApiError::from_domain(&e).into_response();
        }
    }

    let params = request.params();
    let messages = session.history.messages().to_vec();

    if request.stream {
        stream_turn(
            state,
            permit,
            correlation_id,
            session_key,
            user_id,
            resolution,
            messages,
            params,
            started,
        )
        .await
    } else {
        buffered_turn(
            state,
            permit,
            correlation_id,
            session_key,
            user_id,
            resolution,
            messages,
            params,
            started,
        )
        .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context reduction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn reduce_session(
    state: &AppState,
    session: &mut Session,
    session_key: &str,
    resolution: &Resolution,
    correlation_id: &str,
) -> Result<(), Error> {
    let before_tokens = session.history.estimated_tokens();
    let outcome = apply_strategy(
        &session.history,
        &resolution.context,
        state.router.as_ref(),
    )
    .await;

    session.history = outcome.history;
    session.touch();
    // The reduced history must be in place before dispatch; a store
    // failure here is a pre-response failure and maps to 503.
    state.store.put(session_key, session).await?;

    if let Some(ref summary) = outcome.summary {
        if resolution.context.memory_zone_enabled {
            if let Err(e) = state
                .store
                .append_memory(session_key, summary.clone())
                .await
            {
                tracing::warn!(error = %e, "memory zone append failed");
            }
        }
    }

    TraceEvent::ContextReduction {
        correlation_id: correlation_id.to_string(),
        session_key: session_key.to_string(),
        strategy: outcome.strategy.to_string(),
        fallback: outcome.fallback,
        before_tokens,
        after_tokens: session.history.estimated_tokens(),
    }
    .emit();
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Non-streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[allow(clippy::too_many_arguments)]
async fn buffered_turn(
    state: AppState,
    _permit: OwnedSemaphorePermit,
    correlation_id: String,
    session_key: String,
    user_id: String,
    resolution: Resolution,
    messages: Vec<Message>,
    params: RequestParams,
    started: Instant,
) -> Response {
    let mut completion = match state.router.dispatch(&resolution, &messages, &params).await {
        Ok(completion) => completion,
        Err(e) => {
            emit_provider_error(&correlation_id, &session_key, &resolution, &e);
            return ApiError::from_domain(&e).into_response();
        }
    };

    // Rewrite the model back to the display name; everything else in
    // the body passes through unchanged.
    completion.set_model(&resolution.display);

    let content = completion.content().unwrap_or_default().to_string();
    if !content.is_empty() {
        if let Err(e) = state
            .store
            .append_message(&session_key, &user_id, Message::assistant(&content))
            .await
        {
            tracing::warn!(error = %e, session_key = %session_key, "assistant turn write failed");
        }
    }

    let (usage, estimated) = match completion.usage() {
        Some(usage) => (usage, false),
        None => (estimate_usage(&messages, &content, ""), true),
    };
    TraceEvent::ApiCompletion {
        correlation_id,
        session_key,
        model: resolution.display.clone(),
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        estimated,
        duration_ms: started.elapsed().as_millis() as u64,
    }
    .emit();

    Json(completion.into_value()).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[allow(clippy::too_many_arguments)]
async fn stream_turn(
    state: AppState,
    permit: OwnedSemaphorePermit,
    correlation_id: String,
    session_key: String,
    user_id: String,
    resolution: Resolution,
    messages: Vec<Message>,
    params: RequestParams,
    started: Instant,
) -> Response {
    let mut upstream = match state
        .router
        .stream_dispatch(&resolution, &messages, &params)
        .await
    {
        Ok(upstream) => upstream,
        Err(e) => {
            // The stream never started; answer with a plain envelope.
            emit_provider_error(&correlation_id, &session_key, &resolution, &e);
            return ApiError::from_domain(&e).into_response();
        }
    };

    let prompt_estimate = messages
        .iter()
        .map(Message::estimated_tokens)
        .sum::<u64>();
    let display = resolution.display.clone();

    let stream = async_stream::stream! {
        let _permit = permit;
        let mut content = String::new();
        let mut reasoning = String::new();
        let mut usage: Option<Usage> = None;
        let mut failed = false;

        while let Some(event) = upstream.next().await {
            match event {
                Ok(ChunkEvent::Chunk(chunk)) => {
                    if let Some(ref delta) = chunk.content {
                        content.push_str(delta);
                    }
                    if let Some(ref delta) = chunk.reasoning {
                        reasoning.push_str(delta);
                    }
                    if chunk.usage.is_some() {
                        usage = chunk.usage;
                    }
                    // Verbatim passthrough of the upstream payload.
                    yield Ok::<_, std::convert::Infallible>(
                        Event::default().data(chunk.raw),
                    );
                }
                Ok(ChunkEvent::Done) => break,
                Err(e) => {
                    emit_provider_error(&correlation_id, &session_key, &resolution, &e);
                    let frame = ApiError::from_domain(&e).envelope();
                    yield Ok(Event::default().data(frame.to_string()));
                    failed = true;
                    break;
                }
            }
        }

        yield Ok(Event::default().data("[DONE]"));

        // Post-stream bookkeeping. A client disconnect drops this
        // generator before reaching here, cancelling the upstream
        // request and discarding the partial turn.
        if !reasoning.is_empty() {
            TraceEvent::ReasoningDetected {
                correlation_id: correlation_id.clone(),
                session_key: session_key.clone(),
                model: display.clone(),
                reasoning_length: reasoning.len(),
            }
            .emit();
        }

        if !failed {
            let assistant_text = if !content.is_empty() {
                content.clone()
            } else {
                reasoning.clone()
            };
            if !assistant_text.is_empty() {
                if let Err(e) = state
                    .store
                    .append_message(&session_key, &user_id, Message::assistant(&assistant_text))
                    .await
                {
                    tracing::warn!(
                        error = %e,
                        session_key = %session_key,
                        "assistant turn write failed"
                    );
                }
            }

            let (usage, estimated) = match usage {
                Some(usage) => (usage, false),
                None => {
                    let completion_tokens =
                        estimate_tokens(&content) + estimate_tokens(&reasoning);
                    (
                        Usage {
                            prompt_tokens: clamp_u32(prompt_estimate),
                            completion_tokens: clamp_u32(completion_tokens),
                            total_tokens: clamp_u32(prompt_estimate + completion_tokens),
                        },
                        true,
                    )
                }
            };
            TraceEvent::ApiCompletion {
                correlation_id,
                session_key,
                model: display,
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
                estimated,
                duration_ms: started.elapsed().as_millis() as u64,
            }
            .emit();
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Count the trailing messages of `incoming` that are new relative to
/// the stored history (trailing-suffix comparison by role + content).
/// Used only for observability; the replace policy adopts the incoming
/// transcript wholesale.
fn new_message_delta(prior: &[Message], incoming: &[Message]) -> usize {
    let shared = prior
        .iter()
        .zip(incoming.iter())
        .take_while(|(a, b)| a.role == b.role && a.content == b.content)
        .count();
    if shared == prior.len() {
        incoming.len() - shared
    } else {
        // The client rewrote earlier turns; treat the whole transcript
        // as new.
        incoming.len()
    }
}

fn estimate_usage(messages: &[Message], content: &str, reasoning: &str) -> Usage {
    let prompt = messages.iter().map(Message::estimated_tokens).sum::<u64>();
    let completion = estimate_tokens(content) + estimate_tokens(reasoning);
    Usage {
        prompt_tokens: clamp_u32(prompt),
        completion_tokens: clamp_u32(completion),
        total_tokens: clamp_u32(prompt + completion),
    }
}

fn clamp_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

fn emit_provider_error(
    correlation_id: &str,
    session_key: &str,
    resolution: &Resolution,
    e: &Error,
) {
    let status = match e {
        Error::Provider { status, .. } => *status,
        _ => None,
    };
    TraceEvent::ProviderError {
        correlation_id: correlation_id.to_string(),
        session_key: session_key.to_string(),
        provider: resolution.provider.name.clone(),
        status,
        message: e.to_string(),
    }
    .emit();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_counts_trailing_new_messages() {
        let prior = vec![Message::user("hi"), Message::assistant("hello")];
        let incoming = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("next question"),
        ];
        assert_eq!(new_message_delta(&prior, &incoming), 1);
    }

    #[test]
    fn delta_for_fresh_session_is_everything() {
        let incoming = vec![Message::user("hi")];
        assert_eq!(new_message_delta(&[], &incoming), 1);
    }

    #[test]
    fn rewritten_transcript_counts_as_all_new() {
        let prior = vec![Message::user("original")];
        let incoming = vec![Message::user("edited"), Message::user("more")];
        assert_eq!(new_message_delta(&prior, &incoming), 2);
    }

    #[test]
    fn estimated_usage_sums_prompt_and_completion() {
        let messages = vec![Message::user("abcd")]; // 1 token
        let usage = estimate_usage(&messages, "abcdefgh", ""); // 2 tokens
        assert_eq!(usage.prompt_tokens, 1);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.total_tokens, 3);
    }
}
