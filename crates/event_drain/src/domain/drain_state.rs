use std::fmt;
use tokio::sync::watch;

/// Lifecycle of one drain session.
///
/// `Disconnected -> Connecting -> Subscribed -> Consuming`, and back to
/// `Disconnected` whenever the session ends. Per-message failures never
/// leave `Consuming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Disconnected,
    Connecting,
    Subscribed,
    Consuming,
}

impl fmt::Display for DrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DrainState::Disconnected => "disconnected",
            DrainState::Connecting => "connecting",
            DrainState::Subscribed => "subscribed",
            DrainState::Consuming => "consuming",
        };
        f.write_str(name)
    }
}

/// Publishes state changes to any number of watchers
#[derive(Debug, Clone)]
pub struct DrainStateHandle {
    sender: watch::Sender<DrainState>,
}

impl DrainStateHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(DrainState::Disconnected);
        Self { sender }
    }

    pub fn set(&self, state: DrainState) {
        let previous = self.sender.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "drain state changed");
        }
    }

    pub fn current(&self) -> DrainState {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DrainState> {
        self.sender.subscribe()
    }
}

impl Default for DrainStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watchers_see_transitions() {
        let handle = DrainStateHandle::new();
        let mut rx = handle.subscribe();
        assert_eq!(*rx.borrow(), DrainState::Disconnected);

        handle.set(DrainState::Connecting);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), DrainState::Connecting);

        handle.set(DrainState::Consuming);
        assert_eq!(handle.current(), DrainState::Consuming);
    }

    #[test]
    fn test_set_without_watchers_does_not_fail() {
        let handle = DrainStateHandle::new();
        handle.set(DrainState::Subscribed);
        assert_eq!(handle.current(), DrainState::Subscribed);
    }
}
