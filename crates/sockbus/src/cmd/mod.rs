use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use sockbus_endpoint::{ClientConfig, ServerConfig};

use crate::exit::{endpoint_error, io_error, CliResult};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve and reply to every message on its own topic.
    Echo(EchoArgs),
    /// Connect and send a single message.
    Send(SendArgs),
    /// Serve and print received messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Listen(args) => listen::run(args, format).await,
        Command::Version(args) => version::run(args, format),
    }
}

/// Where to listen or connect.
///
/// Values from `--config` are used first; explicit flags override them.
#[derive(Args, Debug, Clone, Default)]
pub struct AddressArgs {
    /// Unix socket path [default: /tmp/ipc.sock].
    #[arg(long, env = "SOCKBUS_PATH", value_name = "PATH")]
    pub path: Option<PathBuf>,
    /// TCP host, used together with --port [default: 127.0.0.1].
    #[arg(long, env = "SOCKBUS_HOST")]
    pub host: Option<String>,
    /// TCP port. Selects TCP instead of the socket path.
    #[arg(long, env = "SOCKBUS_PORT")]
    pub port: Option<u16>,
    /// JSON config file with endpoint options.
    #[arg(long, env = "SOCKBUS_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl AddressArgs {
    pub fn server_config(&self) -> CliResult<ServerConfig> {
        let mut config = match self.read_config()? {
            Some(json) => ServerConfig::from_json(&json)
                .map_err(|err| endpoint_error("invalid config", err))?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config.path, &mut config.host, &mut config.port);
        config
            .validate()
            .map_err(|err| endpoint_error("invalid config", err))?;
        Ok(config)
    }

    pub fn client_config(&self) -> CliResult<ClientConfig> {
        let mut config = match self.read_config()? {
            Some(json) => ClientConfig::from_json(&json)
                .map_err(|err| endpoint_error("invalid config", err))?,
            None => ClientConfig::default(),
        };
        self.apply(&mut config.path, &mut config.host, &mut config.port);
        config
            .validate()
            .map_err(|err| endpoint_error("invalid config", err))?;
        Ok(config)
    }

    fn read_config(&self) -> CliResult<Option<String>> {
        let Some(path) = &self.config else {
            return Ok(None);
        };
        std::fs::read_to_string(path)
            .map(Some)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
    }

    fn apply(&self, path: &mut PathBuf, host: &mut Option<String>, port: &mut Option<u16>) {
        if let Some(value) = &self.path {
            path.clone_from(value);
        }
        if self.host.is_some() {
            host.clone_from(&self.host);
        }
        if self.port.is_some() {
            *port = self.port;
        }
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    #[command(flatten)]
    pub address: AddressArgs,
    /// Exit after echoing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Topic to send on.
    pub topic: String,
    #[command(flatten)]
    pub address: AddressArgs,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// String payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read a JSON payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub timeout: Duration,
    /// Wait for one message on this topic and print it.
    #[arg(long, value_name = "TOPIC")]
    pub wait: Option<String>,
    /// Maximum time to wait for the reply when --wait is set.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub wait_timeout: Duration,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub address: AddressArgs,
    /// Topic patterns to print (comma-separated; `*` matches one segment,
    /// a trailing `**` the rest). Default: everything.
    #[arg(long = "topic", value_delimiter = ',')]
    pub topics: Vec<String>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Resolve on Ctrl-C. If the handler cannot be installed, never resolve.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}
