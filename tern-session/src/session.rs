use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tern_client::BrokerAddress;
use tern_core::qos::QoS;
use tern_core::topic::check_topic_filter;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{error::Elapsed, timeout};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{ConnectError, Result, SessionError, SubscribeError};
use crate::state::SessionStatus;
use crate::transport::{
    Listener, OpenOptions, TaggedEvent, Transport, TransportError, TransportEvent, TransportHandle,
};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Connect {
        address: BrokerAddress,
        client_id: String,
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Subscribe {
        topic: String,
        qos: QoS,
        reply: Reply<QoS>,
    },
    Publish {
        topic: String,
        payload: Bytes,
        qos: QoS,
        retained: bool,
        reply: Reply<()>,
    },
}

/// Handle to a session. Clones share the same session.
///
/// The session stops, closing any open connection, once every handle is
/// dropped.
#[derive(Clone)]
pub struct Session {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
    default_qos: QoS,
}

impl Session {
    /// Start a session on the current tokio runtime.
    pub fn new<T: Transport>(transport: T, config: SessionConfig) -> Session {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);
        let default_qos = config.default_qos;

        let controller = Controller {
            transport: Arc::new(transport),
            config,
            commands: commands_rx,
            events_tx,
            events_rx,
            status: status_tx,
            handle: None,
            epoch: 0,
        };
        tokio::spawn(controller.run());

        Session {
            commands: commands_tx,
            status: status_rx,
            default_qos,
        }
    }

    /// Connect to `address` (`tcp://host:port`) as `client_id`.
    ///
    /// Resolves once the broker has confirmed the connection or the attempt
    /// has failed. Fails if the session is connecting or connected already.
    pub async fn connect(&self, address: &str, client_id: impl Into<String>) -> Result<()> {
        let address = address.parse::<BrokerAddress>().map_err(ConnectError::from)?;
        self.connect_to(address, client_id).await
    }

    pub async fn connect_to(
        &self,
        address: BrokerAddress,
        client_id: impl Into<String>,
    ) -> Result<()> {
        let client_id = client_id.into();
        self.request(|reply| Command::Connect {
            address,
            client_id,
            reply,
        })
        .await
    }

    /// Close the connection, or abandon a connect attempt in flight.
    ///
    /// The connection is released even when closing it fails. Succeeds
    /// without doing anything when already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Subscribe with the configured default QoS.
    pub async fn subscribe(&self, topic: &str) -> Result<QoS> {
        self.subscribe_with_qos(topic, self.default_qos).await
    }

    /// Returns the QoS granted by the broker.
    pub async fn subscribe_with_qos(&self, topic: &str, qos: QoS) -> Result<QoS> {
        check_topic_filter(topic).map_err(SubscribeError::from)?;

        let topic = topic.to_string();
        self.request(|reply| Command::Subscribe { topic, qos, reply })
            .await
    }

    /// Publish with the configured default QoS and without the retained flag.
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> Result<()> {
        self.publish_with(topic, payload, self.default_qos, false)
            .await
    }

    pub async fn publish_with(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retained: bool,
    ) -> Result<()> {
        let topic = topic.to_string();
        let payload = payload.into();
        self.request(|reply| Command::Publish {
            topic,
            payload,
            qos,
            retained,
            reply,
        })
        .await
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();

        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Shutdown)?;

        response.await.map_err(|_| SessionError::Shutdown)?
    }
}

type OpenFuture<H> =
    Pin<Box<dyn Future<Output = std::result::Result<std::result::Result<H, TransportError>, Elapsed>> + Send>>;

struct PendingConnect<H> {
    open: OpenFuture<H>,
    reply: Reply<()>,
}

/// Owns the transport handle and the status. Runs until every `Session`
/// handle is dropped.
struct Controller<T: Transport> {
    transport: Arc<T>,
    config: SessionConfig,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::Sender<TaggedEvent>,
    events_rx: mpsc::Receiver<TaggedEvent>,
    status: watch::Sender<SessionStatus>,
    handle: Option<T::Handle>,
    // Identifies the live handle; bumped whenever a handle is created or released
    epoch: u64,
}

impl<T: Transport> Controller<T> {
    async fn run(mut self) {
        let mut pending: Option<PendingConnect<T::Handle>> = None;

        loop {
            tokio::select! {
                // Inbound events are applied before the next command
                biased;

                Some(tagged) = self.events_rx.recv() => self.handle_event(tagged),

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut pending).await,
                    None => break,
                },

                result = async {
                    match pending.as_mut() {
                        Some(attempt) => (&mut attempt.open).await,
                        None => future::pending().await,
                    }
                } => {
                    if let Some(attempt) = pending.take() {
                        self.finish_connect(result, attempt.reply);
                    }
                }
            }
        }

        drop(pending);
        // Nothing is listening anymore, so deliveries fail instead of waiting
        self.events_rx.close();
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.close().await {
                warn!("Failed to close connection on shutdown: {}", e);
            }
        }
        debug!("Session stopped");
    }

    async fn handle_command(
        &mut self,
        command: Command,
        pending: &mut Option<PendingConnect<T::Handle>>,
    ) {
        match command {
            Command::Connect {
                address,
                client_id,
                reply,
            } => {
                if pending.is_some() {
                    let _ = reply.send(Err(ConnectError::InProgress.into()));
                } else if self.handle.is_some() {
                    let _ = reply.send(Err(ConnectError::AlreadyConnected.into()));
                } else {
                    *pending = Some(self.start_connect(address, client_id, reply));
                }
            }
            Command::Disconnect { reply } => {
                let _ = reply.send(self.disconnect(pending).await);
            }
            Command::Subscribe { topic, qos, reply } => {
                let _ = reply.send(self.subscribe(topic, qos).await);
            }
            Command::Publish {
                topic,
                payload,
                qos,
                retained,
                reply,
            } => {
                let epoch = self.epoch;
                let (result, lost) = match self.handle.as_mut() {
                    None => (Err(SessionError::NotConnected), None),
                    Some(handle) => {
                        let (result, lost) = apply_events_during(
                            handle.publish(&topic, payload, qos, retained),
                            &mut self.events_rx,
                            &self.status,
                            epoch,
                        )
                        .await;
                        (result.map_err(|e| SessionError::Publish(e.to_string())), lost)
                    }
                };

                match &result {
                    Ok(()) => debug!("Published to `{}`", topic),
                    Err(e) => warn!("Publish to `{}` failed: {}", topic, e),
                }
                if let Some(cause) = lost {
                    self.connection_lost(cause);
                }
                let _ = reply.send(result);
            }
        }
    }

    fn start_connect(
        &mut self,
        address: BrokerAddress,
        client_id: String,
        reply: Reply<()>,
    ) -> PendingConnect<T::Handle> {
        info!("Connecting to {} as `{}`", address, client_id);

        self.epoch += 1;
        self.status
            .send_modify(|status| status.connecting(address.clone(), client_id.clone()));

        let transport = self.transport.clone();
        let options = OpenOptions {
            clean_session: self.config.clean_session,
            keep_alive: self.config.keep_alive,
            connect_timeout: self.config.connect_timeout,
        };
        let open = async move { transport.open(&address, &client_id, &options).await };

        PendingConnect {
            open: Box::pin(timeout(self.config.connect_timeout, open)),
            reply,
        }
    }

    fn finish_connect(
        &mut self,
        result: std::result::Result<std::result::Result<T::Handle, TransportError>, Elapsed>,
        reply: Reply<()>,
    ) {
        let error = match result {
            Ok(Ok(mut handle)) => {
                handle.register_listener(Listener::new(self.epoch, self.events_tx.clone()));
                self.handle = Some(handle);
                self.status.send_modify(|status| status.connected_to_broker());

                info!("Connected");
                let _ = reply.send(Ok(()));
                return;
            }
            Ok(Err(TransportError::Refused(reason))) => ConnectError::Refused(reason),
            Ok(Err(TransportError::Timeout)) | Err(_) => {
                ConnectError::Timeout(self.config.connect_timeout)
            }
            Ok(Err(e)) => ConnectError::Transport(e.to_string()),
        };

        warn!("Connect failed: {}", error);
        self.epoch += 1;
        self.status
            .send_modify(|status| status.disconnected(Some(error.to_string())));
        let _ = reply.send(Err(error.into()));
    }

    async fn disconnect(&mut self, pending: &mut Option<PendingConnect<T::Handle>>) -> Result<()> {
        if let Some(attempt) = pending.take() {
            info!("Connect attempt abandoned");

            // Dropping the open future tears down whatever it had set up
            drop(attempt.open);
            let _ = attempt.reply.send(Err(ConnectError::Aborted.into()));

            self.epoch += 1;
            self.status.send_modify(|status| status.disconnected(None));
            return Ok(());
        }

        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        self.epoch += 1;
        let (closed, _) =
            apply_events_during(handle.close(), &mut self.events_rx, &self.status, self.epoch)
                .await;
        drop(handle);

        self.status.send_modify(|status| status.disconnected(None));

        match closed {
            Ok(()) => {
                info!("Disconnected");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to close connection: {}", e);
                Err(SessionError::TransportClose(e.to_string()))
            }
        }
    }

    async fn subscribe(&mut self, topic: String, qos: QoS) -> Result<QoS> {
        let epoch = self.epoch;
        let Some(handle) = self.handle.as_mut() else {
            return Err(SubscribeError::NotConnected.into());
        };

        let (result, lost) = apply_events_during(
            handle.subscribe(&topic, qos),
            &mut self.events_rx,
            &self.status,
            epoch,
        )
        .await;

        let result = match result {
            Ok(granted) => {
                info!("Subscribed to `{}`, granted {}", topic, granted);
                self.status.send_modify(|status| status.subscribed_to(&topic));
                Ok(granted)
            }
            Err(e) => {
                warn!("Subscribe to `{}` failed: {}", topic, e);
                self.status.send_modify(|status| status.unsubscribed());

                let error = match e {
                    TransportError::Rejected(reason) => SubscribeError::Rejected(reason),
                    other => SubscribeError::Transport(other.to_string()),
                };
                Err(error.into())
            }
        };

        if let Some(cause) = lost {
            self.connection_lost(cause);
        }
        result
    }

    fn handle_event(&mut self, tagged: TaggedEvent) {
        if tagged.epoch != self.epoch || self.handle.is_none() {
            debug!("Dropping event from a released connection");
            return;
        }

        match tagged.event {
            TransportEvent::Message { topic, payload } => apply_message(&self.status, topic, payload),
            TransportEvent::ConnectionLost { cause } => self.connection_lost(cause),
        }
    }

    fn connection_lost(&mut self, cause: String) {
        warn!("Connection lost: {}", cause);

        self.handle = None;
        self.epoch += 1;
        self.status
            .send_modify(|status| status.disconnected(Some(cause)));
    }
}

fn apply_message(status: &watch::Sender<SessionStatus>, topic: String, payload: Bytes) {
    debug!("Message on `{}` ({} bytes)", topic, payload.len());
    status.send_modify(|status| status.message(topic, &payload));
}

/// Drive a transport call to completion while applying inbound events for
/// `epoch`, so a transport that is itself waiting to deliver cannot stall.
///
/// A connection loss is not applied here because the handle is still
/// borrowed by `call`; its cause is returned for the caller to apply.
async fn apply_events_during<F: Future>(
    call: F,
    events: &mut mpsc::Receiver<TaggedEvent>,
    status: &watch::Sender<SessionStatus>,
    epoch: u64,
) -> (F::Output, Option<String>) {
    tokio::pin!(call);
    let mut lost = None;

    let mut apply = |tagged: TaggedEvent| {
        if tagged.epoch != epoch || lost.is_some() {
            debug!("Dropping event from a released connection");
            return;
        }

        match tagged.event {
            TransportEvent::Message { topic, payload } => apply_message(status, topic, payload),
            TransportEvent::ConnectionLost { cause } => lost = Some(cause),
        }
    };

    let output = loop {
        tokio::select! {
            biased;

            output = &mut call => break output,

            Some(tagged) = events.recv() => apply(tagged),
        }
    };

    // Events queued before the call returned precede its result
    while let Ok(tagged) = events.try_recv() {
        apply(tagged);
    }

    (output, lost)
}
