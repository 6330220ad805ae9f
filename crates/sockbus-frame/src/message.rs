use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FrameError, Result};

/// A decoded message: a topic and its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub data: Value,
}

impl Message {
    /// Create a message from an already-built JSON value.
    pub fn new(topic: impl Into<String>, data: Value) -> Self {
        Self {
            topic: topic.into(),
            data,
        }
    }

    /// Create a message by serializing `payload` to JSON.
    pub fn from_payload<T: Serialize + ?Sized>(
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<Self> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(FrameError::EmptyTopic);
        }
        let data = serde_json::to_value(payload).map_err(FrameError::Encode)?;
        Ok(Self { topic, data })
    }

    /// Deserialize the payload into a concrete type.
    pub fn data_as<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn from_payload_serializes_struct() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Reading {
            sensor: String,
            value: f64,
        }

        let reading = Reading {
            sensor: "t1".to_string(),
            value: 21.5,
        };
        let msg = Message::from_payload("readings", &reading).unwrap();
        assert_eq!(msg.data, json!({"sensor": "t1", "value": 21.5}));
        assert_eq!(msg.data_as::<Reading>().unwrap(), reading);
    }

    #[test]
    fn from_payload_rejects_empty_topic() {
        let err = Message::from_payload("", &1).unwrap_err();
        assert!(matches!(err, FrameError::EmptyTopic));
    }

    #[test]
    fn from_payload_rejects_non_string_map_keys() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], "x");
        let err = Message::from_payload("t", &map).unwrap_err();
        assert!(err.is_encode());
    }
}
