use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    git_hash: &'static str,
    default_socket: &'static str,
    delimiter: String,
}

impl VersionOutput {
    fn collect() -> Self {
        Self {
            name: "sockbus",
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("SOCKBUS_BUILD_TARGET").unwrap_or("unknown"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
            git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
            default_socket: sockbus_transport::DEFAULT_SOCKET_PATH,
            delimiter: String::from_utf8_lossy(sockbus_frame::DELIMITER).escape_debug().to_string(),
        }
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if matches!(format, OutputFormat::Json) {
        let out = VersionOutput::collect();
        println!(
            "{}",
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(SUCCESS);
    }

    if !args.extended {
        println!("sockbus {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let out = VersionOutput::collect();
    println!("name: {}", out.name);
    println!("version: {}", out.version);
    println!("target: {}", out.target);
    println!("target_os: {}", out.target_os);
    println!("target_arch: {}", out.target_arch);
    println!("git_hash: {}", out.git_hash);
    println!("default_socket: {}", out.default_socket);
    println!("delimiter: {}", out.delimiter);

    Ok(SUCCESS)
}
