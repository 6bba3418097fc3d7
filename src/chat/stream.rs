use std::{convert::Infallible, time::Duration};

use axum::{
    body::{Body, Bytes},
    debug_handler,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{stream::BoxStream, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::{sync::mpsc, time::timeout};
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    db::Role,
    extract::{AppJson, AppPath},
    groups::{msg::insert_message, owned_group},
    session::SignedIn,
    AppError, AppResult, AppState, Describe,
};

use super::{data_stream::{FinishReason, Frame}, event_text, sse::SseDecoder, Gemini, Turn};

#[derive(Deserialize)]
pub(crate) struct ChatRequest {
    #[serde(default)]
    messages: Vec<Turn>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn chat(
    AppPath(group_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    State(gemini): State<Gemini>,
    SignedIn(user_id): SignedIn,
    AppJson(ChatRequest { messages }): AppJson<ChatRequest>,
) -> AppResult<Response> {
    owned_group(&db_pool, group_id, &user_id).await
        .describe("failed to send the message")?;

    let Some(last) = messages.last() else {
        return Err(AppError::bad_request("messages are required"));
    };
    if last.role != Role::User || last.content.trim().is_empty() {
        return Err(AppError::bad_request("the last message must be a non-empty user message"));
    }

    let upstream = match gemini.stream(&messages).await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::error!("gemini request for group {group_id} failed: {e:#}");
            return Err(AppError::new(StatusCode::BAD_GATEWAY, "the assistant is unavailable"));
        }
    };

    insert_message(&db_pool, group_id, Role::User, &last.content).await
        .describe("failed to save chat message")?;

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(relay(upstream, gemini.idle_timeout(), tx, db_pool, group_id));

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
            (header::HeaderName::from_static("x-vercel-ai-data-stream"), HeaderValue::from_static("v1")),
        ],
        body,
    )
        .into_response())
}

/// Forwards frames to the client while collecting the reply, then stores the
/// reply. Runs to completion even after the client hangs up; an upstream that
/// goes quiet for `idle_timeout` ends the reply with an error.
async fn relay(
    mut upstream: BoxStream<'static, reqwest::Result<Bytes>>,
    idle_timeout: Duration,
    tx: mpsc::Sender<String>,
    db_pool: SqlitePool,
    group_id: i64,
) {
    let mut relay = Relay { tx, client_gone: false, reply: String::new(), finish: FinishReason::Stop };
    let mut sse = SseDecoder::default();

    loop {
        let chunk = match timeout(idle_timeout, upstream.next()).await {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                tracing::warn!("gemini stream for group {group_id} broke off: {e}");
                relay.fail("the response was interrupted".to_owned()).await;
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!("gemini stream for group {group_id} stalled for {idle_timeout:?}");
                relay.fail("the response timed out".to_owned()).await;
                break;
            }
        };

        for data in sse.push(&chunk) {
            relay.event(&data).await;
        }
    }
    for data in sse.finish() {
        relay.event(&data).await;
    }

    relay.close().await;
    if relay.finish == FinishReason::Error {
        tracing::warn!("reply for group {group_id} ended with an error");
    }
    if relay.reply.is_empty() {
        tracing::warn!("gemini produced no text for group {group_id}");
        return;
    }

    // the client's body only ends once `relay` is dropped, so the reply is
    // stored by the time a reader sees the end of the stream
    match insert_message(&db_pool, group_id, Role::Ai, &relay.reply).await {
        Ok(message) => tracing::info!("saved reply {} in group {group_id} ({} bytes)", message.id, relay.reply.len()),
        Err(e) => tracing::error!("failed to save reply for group {group_id}: {e}"),
    }
}

struct Relay {
    tx: mpsc::Sender<String>,
    client_gone: bool,
    reply: String,
    finish: FinishReason,
}

impl Relay {
    async fn send(&mut self, frame: Frame) {
        if self.client_gone {
            return;
        }
        if self.tx.send(frame.encode()).await.is_err() {
            tracing::debug!("client went away, finishing the reply in the background");
            self.client_gone = true;
        }
    }

    async fn event(&mut self, data: &str) {
        match event_text(data) {
            Ok(text) if text.is_empty() => {}
            Ok(text) => {
                self.reply.push_str(&text);
                self.send(Frame::Text(text)).await;
            }
            Err(e) => self.fail(e.to_string()).await,
        }
    }

    async fn fail(&mut self, message: String) {
        self.finish = FinishReason::Error;
        self.send(Frame::Error(message)).await;
    }

    async fn close(&mut self) {
        let finish = self.finish;
        self.send(Frame::Finish(finish)).await;
    }
}
