mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "sockbus", version, about = "Topic-based socket messaging CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format).await;

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "sockbus",
            "send",
            "greet",
            "--path",
            "/tmp/test.sock",
            "--json",
            "{\"x\":1}",
            "--wait",
            "greet-reply",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.topic, "greet");
        assert_eq!(args.wait.as_deref(), Some("greet-reply"));
        assert_eq!(args.timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "sockbus", "send", "t", "--json", "{\"x\":1}", "--data", "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_listen_over_tcp() {
        let cli = Cli::try_parse_from([
            "sockbus", "listen", "--port", "7000", "--topic", "a/*,b", "--count", "2",
        ])
        .expect("listen args should parse");
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.address.port, Some(7000));
        assert_eq!(args.topics, vec!["a/*", "b"]);
        assert_eq!(args.count, Some(2));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["sockbus", "version", "--format", "json"])
            .expect("global flags should parse anywhere");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }
}
