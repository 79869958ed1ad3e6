use std::time::Duration;

use tern_core::qos::QoS;

/// Broker address offered as a prefill by front ends.
pub const DEFAULT_BROKER_ADDRESS: &str = "tcp://192.168.1.38:1883";

/// Topic offered as a prefill by front ends.
pub const DEFAULT_TOPIC: &str = "test/res";

/// How long `connect` waits for the broker to confirm.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Settings that apply to every connection a session makes.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) connect_timeout: Duration,
    pub(crate) keep_alive: u16,
    pub(crate) clean_session: bool,
    pub(crate) default_qos: QoS,
    pub(crate) event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keep_alive: 60,
            clean_session: true,
            default_qos: QoS::AtLeastOnce,
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on waiting for the broker to confirm a connect.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Keep-alive interval in seconds, zero disables it.
    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// QoS used by `subscribe` and `publish` when none is given.
    pub fn default_qos(mut self, qos: QoS) -> Self {
        self.default_qos = qos;
        self
    }

    /// Capacity of the channel carrying inbound transport events.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
