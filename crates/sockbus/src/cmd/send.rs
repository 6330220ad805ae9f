use std::fs;

use serde_json::Value;
use sockbus_endpoint::{ClientConfig, Endpoint, Event};
use tokio::sync::mpsc;

use crate::cmd::SendArgs;
use crate::exit::{
    endpoint_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.topic.is_empty() {
        return Err(CliError::new(USAGE, "topic must not be empty"));
    }
    let payload = resolve_payload(&args)?;
    let config = args.address.client_config()?.with_timeout(args.timeout);

    let endpoint = Endpoint::new();
    let (tx, mut replies) = mpsc::unbounded_channel::<Event>();
    if let Some(topic) = &args.wait {
        endpoint.on(topic, move |event: &Event| {
            if matches!(event, Event::Message { .. }) {
                let _ = tx.send(event.clone());
            }
        });
    }

    let result = exchange(&endpoint, config, &args, &payload, &mut replies, format).await;
    endpoint.close().await;
    result
}

async fn exchange(
    endpoint: &Endpoint,
    config: ClientConfig,
    args: &SendArgs,
    payload: &Value,
    replies: &mut mpsc::UnboundedReceiver<Event>,
    format: OutputFormat,
) -> CliResult<i32> {
    endpoint
        .connect(config)
        .await
        .map_err(|err| endpoint_error("connect failed", err))?;
    endpoint
        .emit(&args.topic, payload)
        .map_err(|err| endpoint_error("send failed", err))?;
    tracing::debug!(topic = %args.topic, "message sent");

    let Some(topic) = &args.wait else {
        return Ok(SUCCESS);
    };
    match tokio::time::timeout(args.wait_timeout, replies.recv()).await {
        Ok(Some(event)) => {
            print_message(&event, format);
            Ok(SUCCESS)
        }
        Ok(None) => Err(CliError::new(
            FAILURE,
            "connection closed before a reply arrived",
        )),
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!("no reply on '{topic}' within {:?}", args.wait_timeout),
        )),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(data) = &args.data {
        return Ok(Value::String(data.clone()));
    }
    if let Some(path) = &args.file {
        let text = fs::read_to_string(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        })?;
        return serde_json::from_str(&text).map_err(|err| {
            CliError::new(
                DATA_INVALID,
                format!("{} is not valid JSON: {err}", path.display()),
            )
        });
    }
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cmd::AddressArgs;

    fn args() -> SendArgs {
        SendArgs {
            topic: "t".to_string(),
            address: AddressArgs::default(),
            json: None,
            data: None,
            file: None,
            timeout: Duration::from_secs(1),
            wait: None,
            wait_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn payload_defaults_to_null() {
        assert_eq!(resolve_payload(&args()).unwrap(), Value::Null);
    }

    #[test]
    fn data_is_sent_as_string() {
        let args = SendArgs {
            data: Some("hello".to_string()),
            ..args()
        };
        assert_eq!(resolve_payload(&args).unwrap(), Value::String("hello".into()));
    }

    #[test]
    fn invalid_json_is_usage_error() {
        let args = SendArgs {
            json: Some("{nope".to_string()),
            ..args()
        };
        assert_eq!(resolve_payload(&args).unwrap_err().code, USAGE);
    }
}
