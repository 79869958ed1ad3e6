//! Tern MQTT Client Library
//!
//! An asynchronous MQTT 3.1.1 client (with 3.1 fallback) over plain TCP.
//!
//! # Example
//!
//! ```no_run
//! use tern_client::{BrokerAddress, ConnectOptions, Event, MqttClient, QoS};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let address: BrokerAddress = "tcp://localhost:1883".parse()?;
//!     let options = ConnectOptions::with_address(address)
//!         .client_id("my-client")
//!         .clean_session(true);
//!
//!     let client = MqttClient::connect(options).await?;
//!
//!     client.subscribe(&[("test/res", QoS::AtLeastOnce)]).await?;
//!     client.publish("test/res", "Hello, MQTT!", QoS::AtLeastOnce).await?;
//!
//!     while let Some(event) = client.recv().await {
//!         if let Event::Message { topic, payload, .. } = event {
//!             println!("{}: {:?}", topic, payload);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod address;
mod client;
mod connection;
mod error;
mod event;
mod options;

pub use address::{AddressError, BrokerAddress, DEFAULT_PORT};
pub use client::MqttClient;
pub use error::{ClientError, Result};
pub use event::{DisconnectReason, Event, SubscribeResult};
pub use options::ConnectOptions;

pub use tern_core::protocol::ProtocolVersion;
pub use tern_core::qos::QoS;
pub use tern_core::return_code::{ConnectReturnCode, SubscribeReturnCode};
