use serde_json::Value;

use super::{MessageSerializer, SerializationError};
use crate::message::{LogicalMessage, MessageMetadata};

/// JSON bodies through `serde_json`
///
/// A body enclosing several messages is a JSON array with one element per
/// enclosed type, in header order. Any other JSON value is decoded once per
/// enclosed type.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMessageSerializer;

impl JsonMessageSerializer {
    pub const CONTENT_TYPE: &'static str = "application/json";
}

impl MessageSerializer for JsonMessageSerializer {
    fn content_type(&self) -> &str {
        Self::CONTENT_TYPE
    }

    fn serialize(&self, message: &LogicalMessage) -> Result<Vec<u8>, SerializationError> {
        let value = message
            .metadata()
            .encode_json(message.instance())
            .ok_or_else(|| SerializationError::InstanceTypeMismatch {
                message_type: message.message_type().to_string(),
            })??;
        Ok(serde_json::to_vec(&value)?)
    }

    fn deserialize(
        &self,
        body: &[u8],
        message_types: &[MessageMetadata],
    ) -> Result<Vec<LogicalMessage>, SerializationError> {
        if message_types.is_empty() {
            return Ok(Vec::new());
        }

        let value: Value = serde_json::from_slice(body)?;
        match value {
            Value::Array(elements) => {
                if elements.len() != message_types.len() {
                    return Err(SerializationError::MessageCountMismatch {
                        expected: message_types.len(),
                        actual: elements.len(),
                    });
                }
                message_types
                    .iter()
                    .zip(elements)
                    .map(|(metadata, element)| decode(metadata, element))
                    .collect()
            }
            single => message_types
                .iter()
                .map(|metadata| decode(metadata, single.clone()))
                .collect(),
        }
    }
}

fn decode(metadata: &MessageMetadata, value: Value) -> Result<LogicalMessage, SerializationError> {
    let instance = metadata.decode_json(value)?;
    Ok(LogicalMessage::from_parts(metadata.clone(), instance))
}
