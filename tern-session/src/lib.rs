//! Session manager for a single MQTT broker connection.
//!
//! A [`Session`] owns at most one live transport handle and publishes its
//! state as [`SessionStatus`] snapshots. All operations are messages to a
//! control task, so a `Session` can be cloned and shared freely.
//!
//! ```no_run
//! use tern_session::{MqttTransport, Session, SessionConfig, DEFAULT_TOPIC};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(MqttTransport::new(), SessionConfig::default());
//!
//!     session.connect("tcp://127.0.0.1:1883", "test1").await?;
//!     session.subscribe(DEFAULT_TOPIC).await?;
//!     session.publish(DEFAULT_TOPIC, "ping").await?;
//!
//!     println!("last message: {}", session.status().last_message);
//!
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod mqtt;
mod session;
mod state;
mod transport;

pub use config::{SessionConfig, DEFAULT_BROKER_ADDRESS, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TOPIC};
pub use error::{ConnectError, SessionError, SubscribeError};
pub use mqtt::{MqttHandle, MqttTransport};
pub use session::Session;
pub use state::{SessionState, SessionStatus};
pub use transport::{Listener, OpenOptions, Transport, TransportError, TransportEvent, TransportHandle};

pub use tern_client::BrokerAddress;
pub use tern_core::qos::QoS;
