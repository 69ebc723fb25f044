use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::{
    dto::sse::ServerEvent,
    services::notifications::{ChannelScope, NotificationSink, NotifyError},
    state::match_state::{MatchId, UserId},
};

/// Capacity of every broadcast channel.
const HUB_CAPACITY: usize = 32;

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

/// Lobby hub plus lazily created per-match and per-user hubs.
pub struct SseHubs {
    lobby: SseHub,
    matches: DashMap<MatchId, SseHub>,
    users: DashMap<UserId, SseHub>,
}

impl Default for SseHubs {
    fn default() -> Self {
        Self::new()
    }
}

impl SseHubs {
    /// Empty hub set.
    pub fn new() -> Self {
        Self {
            lobby: SseHub::new(HUB_CAPACITY),
            matches: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// Subscribe to the stream behind `scope`, creating its hub on first use.
    pub fn subscribe(&self, scope: ChannelScope) -> broadcast::Receiver<ServerEvent> {
        match scope {
            ChannelScope::Lobby => self.lobby.subscribe(),
            ChannelScope::Match(id) => self
                .matches
                .entry(id)
                .or_insert_with(|| SseHub::new(HUB_CAPACITY))
                .subscribe(),
            ChannelScope::User(id) => self
                .users
                .entry(id)
                .or_insert_with(|| SseHub::new(HUB_CAPACITY))
                .subscribe(),
        }
    }

    /// Drop the hub behind `scope` once its last subscriber is gone.
    pub fn release_idle(&self, scope: ChannelScope) {
        match scope {
            ChannelScope::Lobby => {}
            ChannelScope::Match(id) => {
                self.matches
                    .remove_if(&id, |_, hub| hub.receiver_count() == 0);
            }
            ChannelScope::User(id) => {
                self.users.remove_if(&id, |_, hub| hub.receiver_count() == 0);
            }
        }
    }

    /// Whether a hub currently exists for the given match.
    pub fn has_match_hub(&self, id: MatchId) -> bool {
        self.matches.contains_key(&id)
    }

    /// Whether a hub currently exists for the given user.
    pub fn has_user_hub(&self, id: UserId) -> bool {
        self.users.contains_key(&id)
    }
}

impl NotificationSink for SseHubs {
    fn publish(&self, scope: ChannelScope, event: ServerEvent) -> Result<(), NotifyError> {
        // Scopes without subscribers have no hub and the event is simply dropped.
        match scope {
            ChannelScope::Lobby => self.lobby.broadcast(event),
            ChannelScope::Match(id) => {
                if let Some(hub) = self.matches.get(&id) {
                    hub.broadcast(event);
                }
            }
            ChannelScope::User(id) => {
                if let Some(hub) = self.users.get(&id) {
                    hub.broadcast(event);
                }
            }
        }
        Ok(())
    }

    fn close_match(&self, match_id: MatchId) {
        // Dropping the sender ends every subscriber stream.
        self.matches.remove(&match_id);
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn events_reach_only_their_scope() {
        let hubs = SseHubs::new();
        let match_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let mut match_rx = hubs.subscribe(ChannelScope::Match(match_id));
        let mut user_rx = hubs.subscribe(ChannelScope::User(user_id));

        hubs.publish(
            ChannelScope::Match(match_id),
            ServerEvent::new(Some("match.started".into()), "{}".into()),
        )
        .unwrap();

        let received = match_rx.recv().await.unwrap();
        assert_eq!(received.event.as_deref(), Some("match.started"));
        assert!(user_rx.try_recv().is_err());
    }

    #[test]
    fn idle_hubs_are_released() {
        let hubs = SseHubs::new();
        let user_id = Uuid::new_v4();
        let match_id = Uuid::new_v4();

        let user_rx = hubs.subscribe(ChannelScope::User(user_id));
        let match_rx = hubs.subscribe(ChannelScope::Match(match_id));
        hubs.release_idle(ChannelScope::User(user_id));
        assert!(hubs.has_user_hub(user_id));

        drop(user_rx);
        drop(match_rx);
        hubs.release_idle(ChannelScope::User(user_id));
        hubs.release_idle(ChannelScope::Match(match_id));
        assert!(!hubs.has_user_hub(user_id));
        assert!(!hubs.has_match_hub(match_id));
    }

    #[tokio::test]
    async fn closing_a_match_ends_its_streams() {
        let hubs = SseHubs::new();
        let match_id = Uuid::new_v4();
        let mut rx = hubs.subscribe(ChannelScope::Match(match_id));

        hubs.close_match(match_id);

        assert!(!hubs.has_match_hub(match_id));
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
