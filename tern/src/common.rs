//! Command-line arguments and logging setup.

use std::time::Duration;

use clap::Args;
use rand::{distributions::Alphanumeric, Rng};
use tern_session::{SessionConfig, DEFAULT_BROKER_ADDRESS, DEFAULT_TOPIC};

/// Connection arguments; every value can be changed again from the prompt.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Broker address (tcp://host:port)
    #[arg(short = 'b', long, default_value = DEFAULT_BROKER_ADDRESS)]
    pub broker: String,

    /// Topic to subscribe and publish to
    #[arg(short = 't', long, default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Client ID (auto-generated if not specified)
    #[arg(short = 'i', long)]
    pub client_id: Option<String>,

    /// How long to wait for the broker to accept a connection, in milliseconds
    #[arg(long, default_value = "10000")]
    pub connect_timeout: u64,

    /// Keep-alive interval in seconds
    #[arg(short = 'k', long, default_value = "60")]
    pub keep_alive: u16,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl SessionArgs {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .connect_timeout(Duration::from_millis(self.connect_timeout))
            .keep_alive(self.keep_alive)
    }

    /// The configured client ID, or a random one that stays fixed for this run.
    pub fn resolve_client_id(&self) -> String {
        match &self.client_id {
            Some(id) => id.clone(),
            None => generate_client_id(),
        }
    }
}

fn generate_client_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();

    format!("tern-{}", suffix)
}

/// Initialize tracing/logging based on verbosity.
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
