//! Tern - interactive MQTT session client

use clap::Parser;
use tern_session::{
    ConnectError, MqttTransport, Session, SessionError, SessionState, SessionStatus,
};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tracing::debug;

mod common;
use common::{init_logging, SessionArgs};

#[derive(Parser, Debug)]
#[command(name = "tern")]
#[command(about = "Interactive MQTT session client")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    session: SessionArgs,
}

const HELP: &str = "\
commands:
  connect [uri]   connect to the broker and subscribe to the topic
  disconnect      close the connection
  sub [topic]     subscribe to a topic (the current one by default)
  pub <text>      publish text to the topic
  status          show the session status
  help            show this help
  quit            disconnect and exit";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Connect(Option<String>),
    Disconnect,
    Subscribe(Option<String>),
    Publish(String),
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

fn parse_line(line: &str) -> Input {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    match command {
        "" => Input::Empty,
        "connect" | "c" => Input::Connect(argument),
        "disconnect" | "d" => Input::Disconnect,
        "sub" | "subscribe" => Input::Subscribe(argument),
        "pub" | "publish" => match argument {
            Some(text) => Input::Publish(text),
            None => Input::Unknown("pub needs a message".into()),
        },
        "status" | "s" => Input::Status,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => Input::Unknown(format!("unknown command `{}`", other)),
    }
}

/// What the user should hear about a status change the prompt did not cause.
fn describe_change(previous: &SessionStatus, current: &SessionStatus) -> Vec<String> {
    let mut notices = Vec::new();

    if current.messages_received > previous.messages_received {
        notices.push(format!(
            "[{}] {}",
            current.last_topic.as_deref().unwrap_or_default(),
            current.last_message
        ));
    }

    if previous.connected() && current.state == SessionState::Disconnected {
        if let Some(cause) = &current.error {
            notices.push(format!("connection lost: {}", cause));
        }
    }

    notices
}

fn render_status(status: &SessionStatus) -> String {
    let broker = status
        .broker_address
        .as_ref()
        .map(|address| address.to_string())
        .unwrap_or_else(|| "-".into());

    let mut lines = vec![
        format!("state:     {}", status.state),
        format!("broker:    {}", broker),
        format!("client id: {}", status.client_id),
        format!("topic:     {}", status.current_topic),
        format!("last:      {}", status.last_message),
        format!("received:  {}", status.messages_received),
    ];
    if let Some(error) = &status.error {
        lines.push(format!("error:     {}", error));
    }

    lines.join("\n")
}

async fn watch_status(session: Session) {
    let mut previous = session.status();
    let mut updates = WatchStream::new(session.watch());

    while let Some(current) = updates.next().await {
        for notice in describe_change(&previous, &current) {
            println!("{}", notice);
        }
        previous = current;
    }
}

async fn connect_and_subscribe(session: Session, broker: String, client_id: String, topic: String) {
    println!("connecting to {} as {}...", broker, client_id);

    match session.connect(&broker, client_id).await {
        Ok(()) => println!("connected"),
        Err(SessionError::Connection(ConnectError::Aborted)) => {
            println!("connect cancelled");
            return;
        }
        Err(e) => {
            println!("{}", e);
            return;
        }
    }

    match session.subscribe(&topic).await {
        Ok(qos) => println!("subscribed to {} (granted {})", topic, qos),
        Err(e) => println!("{}", e),
    }
}

fn report<T>(result: Result<T, SessionError>, success: impl FnOnce(T) -> String) {
    match result {
        Ok(value) => println!("{}", success(value)),
        Err(e) => println!("{}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.session.verbose);

    let mut broker = cli.session.broker.clone();
    let mut topic = cli.session.topic.clone();
    let client_id = cli.session.resolve_client_id();

    let session = Session::new(MqttTransport::new(), cli.session.to_session_config());
    tokio::spawn(watch_status(session.clone()));

    println!("{}", HELP);
    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_line(&line) {
            Input::Connect(address) => {
                if let Some(address) = address {
                    broker = address;
                }
                tokio::spawn(connect_and_subscribe(
                    session.clone(),
                    broker.clone(),
                    client_id.clone(),
                    topic.clone(),
                ));
            }
            Input::Disconnect => {
                report(session.disconnect().await, |_| "disconnected".into());
            }
            Input::Subscribe(filter) => {
                if let Some(filter) = filter {
                    topic = filter;
                }
                report(session.subscribe(&topic).await, |qos| {
                    format!("subscribed to {} (granted {})", topic, qos)
                });
            }
            Input::Publish(text) => {
                report(session.publish(&topic, text).await, |_| {
                    format!("published to {}", topic)
                });
            }
            Input::Status => println!("{}", render_status(&session.status())),
            Input::Help => println!("{}", HELP),
            Input::Quit => break,
            Input::Empty => {}
            Input::Unknown(message) => println!("{} (try `help`)", message),
        }
    }

    debug!("Leaving, closing session");
    if let Err(e) = session.disconnect().await {
        println!("{}", e);
    }

    Ok(())
}
