use std::fmt;

use tern_client::BrokerAddress;

/// Lifecycle of a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    ConnectedUnsubscribed,
    ConnectedSubscribed,
}

impl SessionState {
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            SessionState::ConnectedUnsubscribed | SessionState::ConnectedSubscribed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::ConnectedUnsubscribed => "connected",
            SessionState::ConnectedSubscribed => "connected, subscribed",
        };
        f.write_str(s)
    }
}

/// Snapshot of everything a front end shows about a session.
///
/// `connected` and `subscribed` are derived from `state`, so a subscribed
/// session is always a connected one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Address of the current or most recent connection.
    pub broker_address: Option<BrokerAddress>,
    pub client_id: String,
    /// Empty unless subscribed.
    pub current_topic: String,
    /// Payload of the most recent message, decoded as lossy UTF-8.
    pub last_message: String,
    pub last_topic: Option<String>,
    /// Why the last connect failed or the connection was lost.
    pub error: Option<String>,
    pub messages_received: u64,
}

impl SessionStatus {
    pub fn connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn subscribed(&self) -> bool {
        self.state == SessionState::ConnectedSubscribed
    }

    pub(crate) fn connecting(&mut self, address: BrokerAddress, client_id: String) {
        self.state = SessionState::Connecting;
        self.broker_address = Some(address);
        self.client_id = client_id;
        self.current_topic.clear();
        self.error = None;
    }

    pub(crate) fn connected_to_broker(&mut self) {
        self.state = SessionState::ConnectedUnsubscribed;
        self.current_topic.clear();
        self.error = None;
    }

    pub(crate) fn subscribed_to(&mut self, topic: &str) {
        self.state = SessionState::ConnectedSubscribed;
        self.current_topic = topic.to_string();
    }

    pub(crate) fn unsubscribed(&mut self) {
        if self.connected() {
            self.state = SessionState::ConnectedUnsubscribed;
        }
        self.current_topic.clear();
    }

    pub(crate) fn disconnected(&mut self, error: Option<String>) {
        self.state = SessionState::Disconnected;
        self.current_topic.clear();
        if error.is_some() {
            self.error = error;
        }
    }

    pub(crate) fn message(&mut self, topic: String, payload: &[u8]) {
        self.last_message = String::from_utf8_lossy(payload).into_owned();
        self.last_topic = Some(topic);
        self.messages_received += 1;
    }
}
