use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::notifications::ChannelScope,
    state::{
        SharedState,
        match_state::{MatchId, UserId},
    },
};

/// Event name of the first message sent on every stream.
pub const HANDSHAKE_EVENT: &str = "handshake";

/// Subscribe to the lobby stream.
pub fn subscribe_lobby(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.sse().subscribe(ChannelScope::Lobby)
}

/// Subscribe to a match stream. The match must exist and still be running.
pub async fn subscribe_match(
    state: &SharedState,
    id: MatchId,
) -> Result<broadcast::Receiver<ServerEvent>, ServiceError> {
    let Some(game) = state.match_store().find_match(id).await? else {
        return Err(ServiceError::NotFound(format!("match `{id}`")));
    };
    if game.status.is_terminal() {
        return Err(ServiceError::InvalidState(format!(
            "match `{id}` is over, fetch its results instead"
        )));
    }
    Ok(state.sse().subscribe(ChannelScope::Match(id)))
}

/// Subscribe to the private stream of a user.
pub fn subscribe_user(state: &SharedState, user: UserId) -> broadcast::Receiver<ServerEvent> {
    state.sse().subscribe(ChannelScope::User(user))
}

/// Build the handshake greeting a client on `scope`.
pub fn handshake(scope: ChannelScope) -> Option<ServerEvent> {
    let stream = match scope {
        ChannelScope::Lobby => "lobby",
        ChannelScope::Match(_) => "match",
        ChannelScope::User(_) => "user",
    };
    ServerEvent::json(
        Some(HANDSHAKE_EVENT.to_string()),
        &Handshake {
            stream: stream.to_string(),
            message: format!("subscribed to {scope}"),
        },
    )
    .ok()
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Convert a broadcast receiver into an SSE response, opening with the handshake
/// and forwarding events until the client disconnects or the channel closes.
///
/// The hub behind `scope` is released once its last stream ends.
pub fn to_sse_stream(
    state: &SharedState,
    receiver: broadcast::Receiver<ServerEvent>,
    scope: ChannelScope,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let state = Arc::clone(state);

    tokio::spawn(async move {
        forward(&tx, receiver, scope).await;
        state.sse().release_idle(scope);
        info!(%scope, "SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn forward(
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    mut receiver: broadcast::Receiver<ServerEvent>,
    scope: ChannelScope,
) {
    if let Some(greeting) = handshake(scope) {
        if tx.send(Ok(to_event(greeting))).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            recv_result = receiver.recv() => {
                match recv_result {
                    Ok(payload) => {
                        if tx.send(Ok(to_event(payload))).await.is_err() {
                            break;
                        }
                    }
                    // Match hubs are dropped once the match ends.
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(%scope, skipped, "SSE subscriber lagged");
                        continue;
                    }
                }
            }
        }
    }
}
