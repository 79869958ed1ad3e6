use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bytes::Bytes;
use tern_core::protocol::ProtocolVersion;
use tern_core::qos::QoS;
use tern_core::return_code::{ConnectReturnCode, SubscribeReturnCode};
use tern_core::topic::{check_topic_filter, check_topic_name};
use tern_packets::ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket};
use tern_packets::connect::ConnectPacket;
use tern_packets::disconnect::DisconnectPacket;
use tern_packets::ping::PingReqPacket;
use tern_packets::publish::PublishPacket;
use tern_packets::subscribe::{SubscribeFilter, SubscribePacket};
use tern_packets::ControlPacket;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{self, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::event::{DisconnectReason, Event, SubscribeResult};
use crate::options::ConnectOptions;

/// Command sent to the client event loop.
enum Command {
    Publish {
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
        response: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        filters: Vec<(String, QoS)>,
        response: oneshot::Sender<Result<Vec<SubscribeReturnCode>>>,
    },
    Disconnect {
        response: oneshot::Sender<Result<()>>,
    },
}

/// An MQTT client for connecting to brokers.
///
/// Every handle method returns once the broker has acknowledged the
/// operation as far as its QoS level requires.
pub struct MqttClient {
    command_tx: mpsc::Sender<Command>,
    event_rx: Mutex<mpsc::UnboundedReceiver<Event>>,
    client_id: String,
    protocol_version: ProtocolVersion,
    operation_timeout: Duration,
}

impl MqttClient {
    /// Connect to an MQTT broker with the given options.
    pub async fn connect(options: ConnectOptions) -> Result<Self> {
        options.validate()?;

        let mut version = options.protocol_version;

        let connection = loop {
            let refused_version = match Self::handshake(&options, version).await {
                Ok(connection) => break connection,
                Err(ClientError::ConnectionRefused(
                    code @ ConnectReturnCode::UnacceptableProtocolVersion,
                )) if options.protocol_fallback => code,
                Err(e) => return Err(e),
            };

            match version.fallback() {
                Some(older) => {
                    warn!("Broker refused {}, retrying with {}", version, older);
                    version = older;
                }
                None => return Err(ClientError::ConnectionRefused(refused_version)),
            }
        };

        info!(
            "Connected to MQTT broker at {}, client_id: `{}`, protocol: {}",
            options.address, options.client_id, version
        );

        // Create channels for communication
        let (command_tx, command_rx) = mpsc::channel(32);
        // Events never wait on the application, so acks and pings keep flowing
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Spawn the client event loop
        let event_loop = EventLoop::new(connection, command_rx, event_tx, options.keep_alive);
        tokio::spawn(event_loop.run());

        Ok(MqttClient {
            command_tx,
            event_rx: Mutex::new(event_rx),
            client_id: options.client_id,
            protocol_version: version,
            operation_timeout: options.operation_timeout,
        })
    }

    /// Open the TCP stream, send CONNECT and wait for CONNACK.
    async fn handshake(options: &ConnectOptions, version: ProtocolVersion) -> Result<Connection> {
        let addr = options.address.socket_addr();
        debug!("Opening connection to {} using {}", addr, version);

        timeout(options.connect_timeout, Self::open(options, version, &addr))
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn open(
        options: &ConnectOptions,
        version: ProtocolVersion,
        addr: &str,
    ) -> Result<Connection> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        stream.set_nodelay(true)?;

        let mut connection = Connection::new(stream);
        connection
            .write_packet(ControlPacket::Connect(ConnectPacket {
                protocol_version: version,
                clean_session: options.clean_session,
                keep_alive: options.keep_alive,
                client_id: options.client_id.clone(),
            }))
            .await?;

        match connection.read_packet().await? {
            Some(ControlPacket::ConnAck(ack)) if ack.return_code.is_accepted() => {
                debug!("CONNACK received, session_present: {}", ack.session_present);
                Ok(connection)
            }
            Some(ControlPacket::ConnAck(ack)) => Err(ClientError::ConnectionRefused(ack.return_code)),
            Some(other) => Err(ClientError::Protocol(format!(
                "expected CONNACK, received {:?}",
                other
            ))),
            None => Err(ClientError::ConnectionFailed(
                "connection closed before CONNACK".into(),
            )),
        }
    }

    /// Client identifier sent in CONNECT.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Protocol version the broker accepted.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Publish a message to a topic.
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>, qos: QoS) -> Result<()> {
        self.publish_with_retain(topic, payload, qos, false).await
    }

    /// Publish a message to a topic with retain flag.
    pub async fn publish_with_retain(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        check_topic_name(topic)?;

        let (response, response_rx) = oneshot::channel();
        self.send_command(Command::Publish {
            topic: topic.to_string(),
            payload: payload.into(),
            qos,
            retain,
            response,
        })
        .await?;

        self.await_response(response_rx).await
    }

    /// Subscribe to one or more topic filters and wait for the SUBACK.
    pub async fn subscribe(&self, filters: &[(&str, QoS)]) -> Result<Vec<SubscribeResult>> {
        for (filter, _) in filters {
            check_topic_filter(filter)?;
        }

        let (response, response_rx) = oneshot::channel();
        self.send_command(Command::Subscribe {
            filters: filters.iter().map(|(f, q)| (f.to_string(), *q)).collect(),
            response,
        })
        .await?;

        let return_codes = self.await_response(response_rx).await?;

        if return_codes.len() != filters.len() {
            return Err(ClientError::Protocol(format!(
                "SUBACK carries {} return codes for {} filters",
                return_codes.len(),
                filters.len()
            )));
        }

        Ok(filters
            .iter()
            .zip(return_codes)
            .map(|((topic, requested), return_code)| SubscribeResult {
                topic: topic.to_string(),
                requested: *requested,
                return_code,
            })
            .collect())
    }

    /// Disconnect from the broker gracefully.
    pub async fn disconnect(&self) -> Result<()> {
        let (response, response_rx) = oneshot::channel();
        self.send_command(Command::Disconnect { response }).await?;

        self.await_response(response_rx).await
    }

    /// Receive the next event from the broker.
    /// Returns None once the event loop has stopped and all events were drained.
    pub async fn recv(&self) -> Option<Event> {
        let mut rx = self.event_rx.lock().await;
        rx.recv().await
    }

    async fn send_command(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    async fn await_response<T>(&self, response_rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        timeout(self.operation_timeout, response_rx)
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|_| ClientError::Disconnected)?
    }
}

/// An outgoing operation waiting for the broker.
enum PendingAck {
    Publish {
        qos: QoS,
        response: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        response: oneshot::Sender<Result<Vec<SubscribeReturnCode>>>,
    },
}

/// Owns the connection. Runs until the connection ends or the client
/// disconnects, and reports why through a final `Event::Disconnected`.
struct EventLoop {
    connection: Connection,
    command_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::UnboundedSender<Event>,
    keep_alive: u16,
    next_packet_id: u16,
    pending: HashMap<u16, PendingAck>,
    // QoS 2 messages delivered to the application whose PUBREL is still due
    incoming_qos2: HashSet<u16>,
    ping_outstanding: bool,
}

impl EventLoop {
    fn new(
        connection: Connection,
        command_rx: mpsc::Receiver<Command>,
        event_tx: mpsc::UnboundedSender<Event>,
        keep_alive: u16,
    ) -> Self {
        EventLoop {
            connection,
            command_rx,
            event_tx,
            keep_alive,
            next_packet_id: 1,
            pending: HashMap::new(),
            incoming_qos2: HashSet::new(),
            ping_outstanding: false,
        }
    }

    async fn run(mut self) {
        let reason = self.drive().await;

        match &reason {
            DisconnectReason::ClientInitiated => info!("Disconnected from broker"),
            reason => warn!("Connection ended: {}", reason),
        }

        // Anyone still waiting for an acknowledgement sees ClientError::Disconnected
        self.pending.clear();

        let _ = self.event_tx.send(Event::Disconnected { reason });
    }

    async fn drive(&mut self) -> DisconnectReason {
        // PINGREQ at half the keep-alive time; zero disables keep-alive
        let keep_alive = self.keep_alive > 0;
        let ping_interval = Duration::from_secs((self.keep_alive / 2).max(1) as u64);
        let mut ping_timer = time::interval(ping_interval);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping_timer.tick().await; // Skip the first immediate tick

        loop {
            tokio::select! {
                maybe_packet = self.connection.read_packet() => {
                    match maybe_packet {
                        Ok(Some(packet)) => {
                            if let Err(reason) = self.handle_incoming_packet(packet).await {
                                return reason;
                            }
                        }
                        Ok(None) => return DisconnectReason::ServerInitiated,
                        Err(ClientError::Packet(e)) => {
                            error!("Malformed packet from broker: {}", e);
                            return DisconnectReason::ProtocolError(e.to_string());
                        }
                        Err(e) => {
                            error!("Error reading packet: {}", e);
                            return DisconnectReason::ConnectionLost(e.to_string());
                        }
                    }
                }

                maybe_cmd = self.command_rx.recv() => {
                    let Some(cmd) = maybe_cmd else {
                        // Every client handle is gone
                        let _ = self.send_disconnect().await;
                        return DisconnectReason::ClientInitiated;
                    };

                    if let Err(reason) = self.handle_command(cmd).await {
                        return reason;
                    }
                }

                _ = ping_timer.tick(), if keep_alive => {
                    if self.ping_outstanding {
                        error!("No PINGRESP within keep-alive period");
                        return DisconnectReason::KeepAliveTimeout;
                    }

                    debug!("Sending PINGREQ");
                    if let Err(reason) = self.write(ControlPacket::PingReq(PingReqPacket {})).await {
                        return reason;
                    }
                    self.ping_outstanding = true;
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) -> std::result::Result<(), DisconnectReason> {
        match cmd {
            Command::Publish {
                topic,
                payload,
                qos,
                retain,
                response,
            } => {
                let packet_id = match qos {
                    QoS::AtMostOnce => None,
                    _ => Some(self.allocate_packet_id()),
                };

                debug!("Sending PUBLISH on `{}`, qos {}", topic, qos);
                self.write(ControlPacket::Publish(PublishPacket {
                    dup: false,
                    qos,
                    retain,
                    topic_name: topic,
                    packet_id,
                    payload,
                }))
                .await?;

                match packet_id {
                    Some(id) => {
                        self.pending.insert(id, PendingAck::Publish { qos, response });
                    }
                    None => {
                        let _ = response.send(Ok(()));
                    }
                }
            }
            Command::Subscribe { filters, response } => {
                let packet_id = self.allocate_packet_id();

                debug!("Sending SUBSCRIBE for {:?}", filters);
                self.write(ControlPacket::Subscribe(SubscribePacket {
                    packet_id,
                    filters: filters
                        .into_iter()
                        .map(|(topic_filter, qos)| SubscribeFilter { topic_filter, qos })
                        .collect(),
                }))
                .await?;

                self.pending
                    .insert(packet_id, PendingAck::Subscribe { response });
            }
            Command::Disconnect { response } => {
                let result = self.send_disconnect().await;
                let _ = response.send(result);
                return Err(DisconnectReason::ClientInitiated);
            }
        }

        Ok(())
    }

    /// Handle an incoming packet from the broker.
    async fn handle_incoming_packet(
        &mut self,
        packet: ControlPacket,
    ) -> std::result::Result<(), DisconnectReason> {
        match packet {
            ControlPacket::Publish(publish) => {
                debug!(
                    "Received PUBLISH on `{}`, qos {}",
                    publish.topic_name, publish.qos
                );

                let deliver = match (publish.qos, publish.packet_id) {
                    (QoS::AtMostOnce, _) => true,
                    (QoS::AtLeastOnce, Some(packet_id)) => {
                        self.write(ControlPacket::PubAck(PubAckPacket { packet_id }))
                            .await?;
                        true
                    }
                    (QoS::ExactlyOnce, Some(packet_id)) => {
                        self.write(ControlPacket::PubRec(PubRecPacket { packet_id }))
                            .await?;
                        // A redelivery before PUBREL must not reach the application twice
                        self.incoming_qos2.insert(packet_id)
                    }
                    (_, None) => {
                        return Err(DisconnectReason::ProtocolError(
                            "PUBLISH without packet identifier".into(),
                        ))
                    }
                };

                if deliver {
                    let _ = self.event_tx.send(Event::Message {
                        topic: publish.topic_name,
                        payload: publish.payload,
                        qos: publish.qos,
                        retain: publish.retain,
                    });
                }
            }
            ControlPacket::PubRel(PubRelPacket { packet_id }) => {
                self.incoming_qos2.remove(&packet_id);
                self.write(ControlPacket::PubComp(PubCompPacket { packet_id }))
                    .await?;
            }
            ControlPacket::PubAck(PubAckPacket { packet_id }) => {
                debug!("Received PUBACK for packet_id: {}", packet_id);
                match self.pending.remove(&packet_id) {
                    Some(PendingAck::Publish {
                        qos: QoS::AtLeastOnce,
                        response,
                    }) => {
                        let _ = response.send(Ok(()));
                    }
                    other => self.unexpected_ack("PUBACK", packet_id, other),
                }
            }
            ControlPacket::PubRec(PubRecPacket { packet_id }) => {
                debug!("Received PUBREC for packet_id: {}", packet_id);
                match self.pending.get(&packet_id) {
                    Some(PendingAck::Publish {
                        qos: QoS::ExactlyOnce,
                        ..
                    }) => {
                        self.write(ControlPacket::PubRel(PubRelPacket { packet_id }))
                            .await?;
                    }
                    _ => warn!("Unexpected PUBREC for packet_id: {}", packet_id),
                }
            }
            ControlPacket::PubComp(PubCompPacket { packet_id }) => {
                debug!("Received PUBCOMP for packet_id: {}", packet_id);
                match self.pending.remove(&packet_id) {
                    Some(PendingAck::Publish {
                        qos: QoS::ExactlyOnce,
                        response,
                    }) => {
                        let _ = response.send(Ok(()));
                    }
                    other => self.unexpected_ack("PUBCOMP", packet_id, other),
                }
            }
            ControlPacket::SubAck(suback) => {
                debug!("Received SUBACK for packet_id: {}", suback.packet_id);
                match self.pending.remove(&suback.packet_id) {
                    Some(PendingAck::Subscribe { response }) => {
                        let _ = response.send(Ok(suback.return_codes));
                    }
                    other => self.unexpected_ack("SUBACK", suback.packet_id, other),
                }
            }
            ControlPacket::PingResp(_) => {
                debug!("Received PINGRESP");
                self.ping_outstanding = false;
            }
            ControlPacket::Disconnect(_) => {
                info!("Received DISCONNECT from server");
                return Err(DisconnectReason::ServerInitiated);
            }
            other => {
                return Err(DisconnectReason::ProtocolError(format!(
                    "unexpected packet from broker: {:?}",
                    other
                )));
            }
        }

        Ok(())
    }

    fn unexpected_ack(&mut self, kind: &str, packet_id: u16, pending: Option<PendingAck>) {
        warn!("Unexpected {} for packet_id: {}", kind, packet_id);

        // Keep whatever was waiting on this id for the acknowledgement it expects
        if let Some(pending) = pending {
            self.pending.insert(packet_id, pending);
        }
    }

    async fn send_disconnect(&mut self) -> Result<()> {
        self.connection
            .write_packet(ControlPacket::Disconnect(DisconnectPacket {}))
            .await?;
        self.connection.shutdown().await
    }

    async fn write(&mut self, packet: ControlPacket) -> std::result::Result<(), DisconnectReason> {
        self.connection.write_packet(packet).await.map_err(|e| {
            error!("Failed to write packet: {}", e);
            DisconnectReason::ConnectionLost(e.to_string())
        })
    }

    /// Next free packet identifier; zero is never used.
    fn allocate_packet_id(&mut self) -> u16 {
        loop {
            let id = self.next_packet_id;
            self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);

            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tern_core::return_code::ConnectReturnCode;
    use tern_packets::connack::ConnAckPacket;
    use tern_packets::ping::PingRespPacket;
    use tern_packets::suback::SubAckPacket;
    use tokio::net::TcpListener;

    use super::*;

    async fn fake_broker() -> (TcpListener, ConnectOptions) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let options = ConnectOptions::new("127.0.0.1", port)
            .client_id("test1")
            .connect_timeout(Duration::from_secs(5))
            .operation_timeout(Duration::from_secs(5));

        (listener, options)
    }

    async fn accept(listener: &TcpListener, code: ConnectReturnCode) -> (Connection, ConnectPacket) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut connection = Connection::new(stream);

        let connect = match connection.read_packet().await.unwrap() {
            Some(ControlPacket::Connect(connect)) => connect,
            other => panic!("expected CONNECT, got {:?}", other),
        };

        connection
            .write_packet(ControlPacket::ConnAck(ConnAckPacket {
                session_present: false,
                return_code: code,
            }))
            .await
            .unwrap();

        (connection, connect)
    }

    #[tokio::test]
    async fn test_connect_sends_clean_session_connect() {
        let (listener, options) = fake_broker().await;

        let broker = tokio::spawn(async move {
            let (_connection, connect) = accept(&listener, ConnectReturnCode::Accepted).await;
            connect
        });

        let client = MqttClient::connect(options).await.unwrap();
        let connect = broker.await.unwrap();

        assert_eq!(connect.client_id, "test1");
        assert!(connect.clean_session);
        assert_eq!(connect.protocol_version, ProtocolVersion::V3_1_1);
        assert_eq!(client.protocol_version(), ProtocolVersion::V3_1_1);
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_v3_1() {
        let (listener, options) = fake_broker().await;

        let broker = tokio::spawn(async move {
            let (_refused, first) =
                accept(&listener, ConnectReturnCode::UnacceptableProtocolVersion).await;
            let (connection, second) = accept(&listener, ConnectReturnCode::Accepted).await;
            (first.protocol_version, second.protocol_version, connection)
        });

        let client = MqttClient::connect(options).await.unwrap();
        let (first, second, _connection) = broker.await.unwrap();

        assert_eq!(first, ProtocolVersion::V3_1_1);
        assert_eq!(second, ProtocolVersion::V3_1);
        assert_eq!(client.protocol_version(), ProtocolVersion::V3_1);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let (listener, options) = fake_broker().await;

        tokio::spawn(async move {
            let _ = accept(&listener, ConnectReturnCode::NotAuthorized).await;
        });

        match MqttClient::connect(options).await {
            Err(ClientError::ConnectionRefused(code)) => {
                assert_eq!(code, ConnectReturnCode::NotAuthorized)
            }
            other => panic!("expected refusal, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_connect_times_out_without_connack() {
        let (listener, options) = fake_broker().await;
        let options = options.connect_timeout(Duration::from_millis(200));

        let broker = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Hold the socket open without answering
            time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let result = MqttClient::connect(options).await;
        assert!(matches!(result, Err(ClientError::Timeout)));

        broker.abort();
    }

    #[tokio::test]
    async fn test_subscribe_waits_for_suback() {
        let (listener, options) = fake_broker().await;

        tokio::spawn(async move {
            let (mut connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;

            let subscribe = match connection.read_packet().await.unwrap() {
                Some(ControlPacket::Subscribe(subscribe)) => subscribe,
                other => panic!("expected SUBSCRIBE, got {:?}", other),
            };
            assert_eq!(subscribe.filters[0].topic_filter, "test/res");

            connection
                .write_packet(ControlPacket::SubAck(SubAckPacket {
                    packet_id: subscribe.packet_id,
                    return_codes: vec![SubscribeReturnCode::Granted(QoS::AtMostOnce)],
                }))
                .await
                .unwrap();

            // Keep the connection alive until the client goes away
            let _ = connection.read_packet().await;
        });

        let client = MqttClient::connect(options).await.unwrap();
        let results = client
            .subscribe(&[("test/res", QoS::AtLeastOnce)])
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());
        assert_eq!(results[0].granted(), Some(QoS::AtMostOnce));
    }

    #[tokio::test]
    async fn test_subscribe_rejected_filter_is_reported() {
        let (listener, options) = fake_broker().await;

        tokio::spawn(async move {
            let (mut connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;

            if let Some(ControlPacket::Subscribe(subscribe)) =
                connection.read_packet().await.unwrap()
            {
                connection
                    .write_packet(ControlPacket::SubAck(SubAckPacket {
                        packet_id: subscribe.packet_id,
                        return_codes: vec![SubscribeReturnCode::Failure],
                    }))
                    .await
                    .unwrap();
            }

            let _ = connection.read_packet().await;
        });

        let client = MqttClient::connect(options).await.unwrap();
        let results = client
            .subscribe(&[("forbidden", QoS::AtLeastOnce)])
            .await
            .unwrap();

        assert!(!results[0].is_success());
    }

    #[tokio::test]
    async fn test_publish_qos1_waits_for_puback() {
        let (listener, options) = fake_broker().await;

        let broker = tokio::spawn(async move {
            let (mut connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;

            let publish = match connection.read_packet().await.unwrap() {
                Some(ControlPacket::Publish(publish)) => publish,
                other => panic!("expected PUBLISH, got {:?}", other),
            };

            connection
                .write_packet(ControlPacket::PubAck(PubAckPacket {
                    packet_id: publish.packet_id.unwrap(),
                }))
                .await
                .unwrap();

            let _ = connection.read_packet().await;
            publish
        });

        let client = MqttClient::connect(options).await.unwrap();
        client
            .publish("test/res", "ping", QoS::AtLeastOnce)
            .await
            .unwrap();
        client.disconnect().await.unwrap();

        let publish = broker.await.unwrap();
        assert_eq!(publish.topic_name, "test/res");
        assert_eq!(publish.payload, Bytes::from_static(b"ping"));
        assert!(!publish.retain);
    }

    #[tokio::test]
    async fn test_publish_qos2_completes_handshake() {
        let (listener, options) = fake_broker().await;

        tokio::spawn(async move {
            let (mut connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;

            let packet_id = match connection.read_packet().await.unwrap() {
                Some(ControlPacket::Publish(publish)) => publish.packet_id.unwrap(),
                other => panic!("expected PUBLISH, got {:?}", other),
            };

            connection
                .write_packet(ControlPacket::PubRec(PubRecPacket { packet_id }))
                .await
                .unwrap();

            match connection.read_packet().await.unwrap() {
                Some(ControlPacket::PubRel(rel)) => assert_eq!(rel.packet_id, packet_id),
                other => panic!("expected PUBREL, got {:?}", other),
            }

            connection
                .write_packet(ControlPacket::PubComp(PubCompPacket { packet_id }))
                .await
                .unwrap();

            let _ = connection.read_packet().await;
        });

        let client = MqttClient::connect(options).await.unwrap();
        client
            .publish("test/res", "exactly", QoS::ExactlyOnce)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_rejects_wildcard_topic() {
        let (listener, options) = fake_broker().await;

        tokio::spawn(async move {
            let (mut connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;
            let _ = connection.read_packet().await;
        });

        let client = MqttClient::connect(options).await.unwrap();
        let result = client.publish("test/#", "x", QoS::AtMostOnce).await;

        assert!(matches!(result, Err(ClientError::InvalidTopic(_))));
    }

    #[tokio::test]
    async fn test_incoming_messages_are_acknowledged_and_delivered() {
        let (listener, options) = fake_broker().await;

        let broker = tokio::spawn(async move {
            let (mut connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;

            connection
                .write_packet(ControlPacket::Publish(PublishPacket {
                    dup: false,
                    qos: QoS::AtLeastOnce,
                    retain: false,
                    topic_name: "test/res".into(),
                    packet_id: Some(42),
                    payload: Bytes::from_static(b"hello"),
                }))
                .await
                .unwrap();

            let ack = connection.read_packet().await.unwrap();
            assert_eq!(
                ack,
                Some(ControlPacket::PubAck(PubAckPacket { packet_id: 42 }))
            );
        });

        let client = MqttClient::connect(options).await.unwrap();

        match client.recv().await {
            Some(Event::Message { topic, payload, .. }) => {
                assert_eq!(topic, "test/res");
                assert_eq!(payload, Bytes::from_static(b"hello"));
            }
            other => panic!("expected message, got {:?}", other),
        }

        broker.await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_qos2_delivery_is_suppressed() {
        let (listener, options) = fake_broker().await;

        tokio::spawn(async move {
            let (mut connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;

            let publish = PublishPacket {
                dup: false,
                qos: QoS::ExactlyOnce,
                retain: false,
                topic_name: "test/res".into(),
                packet_id: Some(7),
                payload: Bytes::from_static(b"once"),
            };

            connection
                .write_packet(ControlPacket::Publish(publish.clone()))
                .await
                .unwrap();
            connection
                .write_packet(ControlPacket::Publish(PublishPacket { dup: true, ..publish }))
                .await
                .unwrap();
            connection
                .write_packet(ControlPacket::PubRel(PubRelPacket { packet_id: 7 }))
                .await
                .unwrap();
            connection
                .write_packet(ControlPacket::Publish(PublishPacket {
                    dup: false,
                    qos: QoS::AtMostOnce,
                    retain: false,
                    topic_name: "test/res".into(),
                    packet_id: None,
                    payload: Bytes::from_static(b"after"),
                }))
                .await
                .unwrap();

            let _ = connection.read_packet().await;
        });

        let client = MqttClient::connect(options).await.unwrap();

        let mut payloads = Vec::new();
        for _ in 0..2 {
            if let Some(Event::Message { payload, .. }) = client.recv().await {
                payloads.push(payload);
            }
        }

        assert_eq!(
            payloads,
            vec![Bytes::from_static(b"once"), Bytes::from_static(b"after")]
        );
    }

    #[tokio::test]
    async fn test_broker_close_is_reported_as_disconnect() {
        let (listener, options) = fake_broker().await;

        tokio::spawn(async move {
            let (connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;
            drop(connection);
        });

        let client = MqttClient::connect(options).await.unwrap();

        match client.recv().await {
            Some(Event::Disconnected { reason }) => {
                assert_eq!(reason, DisconnectReason::ServerInitiated)
            }
            other => panic!("expected disconnect, got {:?}", other),
        }

        let result = client.publish("test/res", "late", QoS::AtMostOnce).await;
        assert!(matches!(result, Err(ClientError::Disconnected)));
    }

    #[tokio::test]
    async fn test_oversized_client_id_is_rejected_before_connecting() {
        let (listener, options) = fake_broker().await;
        let options = options.client_id("x".repeat(70_000));

        let result = MqttClient::connect(options).await;
        assert!(matches!(result, Err(ClientError::InvalidClientId(_))));

        let accepted = timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(accepted.is_err(), "no connection should have been opened");
    }

    #[tokio::test]
    async fn test_unread_messages_do_not_stall_acknowledgements() {
        const FLOOD: usize = 600;

        let (listener, options) = fake_broker().await;
        let options = options.operation_timeout(Duration::from_secs(2));

        tokio::spawn(async move {
            let (mut connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;

            let packet_id = match connection.read_packet().await.unwrap() {
                Some(ControlPacket::Publish(publish)) => publish.packet_id.unwrap(),
                other => panic!("expected PUBLISH, got {:?}", other),
            };

            for i in 0..FLOOD {
                connection
                    .write_packet(ControlPacket::Publish(PublishPacket {
                        dup: false,
                        qos: QoS::AtMostOnce,
                        retain: false,
                        topic_name: "test/res".into(),
                        packet_id: None,
                        payload: Bytes::from(i.to_string()),
                    }))
                    .await
                    .unwrap();
            }

            connection
                .write_packet(ControlPacket::PubAck(PubAckPacket { packet_id }))
                .await
                .unwrap();

            let _ = connection.read_packet().await;
        });

        let client = MqttClient::connect(options).await.unwrap();

        // Nobody reads events while the PUBACK is queued behind the flood
        client
            .publish("test/res", "request", QoS::AtLeastOnce)
            .await
            .unwrap();

        let mut received = 0;
        while received < FLOOD {
            match client.recv().await {
                Some(Event::Message { .. }) => received += 1,
                other => panic!("expected message, got {:?}", other),
            }
        }

        client.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_keep_alive_pings_keep_connection_open() {
        let (listener, options) = fake_broker().await;
        let options = options.keep_alive(2);

        let broker = tokio::spawn(async move {
            let (mut connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;

            let mut pings = 0;
            while let Ok(Some(packet)) = connection.read_packet().await {
                match packet {
                    ControlPacket::PingReq(_) => {
                        pings += 1;
                        connection
                            .write_packet(ControlPacket::PingResp(PingRespPacket {}))
                            .await
                            .unwrap();
                    }
                    ControlPacket::Disconnect(_) => break,
                    _ => {}
                }
            }
            pings
        });

        let client = MqttClient::connect(options).await.unwrap();

        // Pings go out once a second; two rounds must be answered in time
        time::sleep(Duration::from_millis(2500)).await;

        let idle = timeout(Duration::from_millis(100), client.recv()).await;
        assert!(idle.is_err(), "unexpected event: {:?}", idle);

        client
            .publish("test/res", "still here", QoS::AtMostOnce)
            .await
            .unwrap();
        client.disconnect().await.unwrap();

        let pings = broker.await.unwrap();
        assert!(pings >= 2, "broker saw {} pings", pings);
    }

    #[tokio::test]
    async fn test_missing_pingresp_ends_connection() {
        let (listener, options) = fake_broker().await;
        let options = options.keep_alive(2);

        let broker = tokio::spawn(async move {
            let (mut connection, _) = accept(&listener, ConnectReturnCode::Accepted).await;

            // Read everything, answer nothing
            let mut pinged = false;
            while let Ok(Some(packet)) = connection.read_packet().await {
                pinged |= matches!(packet, ControlPacket::PingReq(_));
            }
            pinged
        });

        let client = MqttClient::connect(options).await.unwrap();

        match timeout(Duration::from_secs(5), client.recv()).await {
            Ok(Some(Event::Disconnected { reason })) => {
                assert_eq!(reason, DisconnectReason::KeepAliveTimeout)
            }
            other => panic!("expected keep-alive timeout, got {:?}", other),
        }

        assert!(broker.await.unwrap());

        let result = client.publish("test/res", "late", QoS::AtMostOnce).await;
        assert!(matches!(result, Err(ClientError::Disconnected)));
    }
}
