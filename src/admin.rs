//! The REST-admin outbound-inject entry point (spec.md §6). The REST
//! server itself is an external collaborator; this module defines only the
//! wire envelope it exchanges with us and the function that places a
//! caller-built message at the top of the outbound pipeline.
//!
//! Envelope: `{"type": <msg-type>, "fields": [[tag, value], ...]}`, with
//! each field value base64-encoded so arbitrary byte payloads round-trip
//! through JSON.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::dictionary::GroupRegistry;
use crate::error::{FixError, Result};
use crate::message::Message;

/// One (tag, base64 value) pair as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeField(pub u32, pub String);

/// The JSON envelope exchanged with the admin REST surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminEnvelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub fields: Vec<EnvelopeField>,
}

impl AdminEnvelope {
    pub fn from_message(msg: &Message) -> Self {
        let fields = msg
            .fields()
            .flatten()
            .into_iter()
            .map(|(tag, value)| EnvelopeField(tag, BASE64.encode(value)))
            .collect();
        Self {
            msg_type: msg.msg_type().unwrap_or("").to_string(),
            fields,
        }
    }

    /// Decodes the envelope into a [`Message`], resolving repeating groups
    /// against `registry` the same way the wire codec does.
    pub fn into_message(self, begin_string: impl Into<String>, registry: &GroupRegistry) -> Result<Message> {
        let mut pairs = Vec::with_capacity(self.fields.len());
        for EnvelopeField(tag, value) in self.fields {
            let raw = BASE64
                .decode(value.as_bytes())
                .map_err(|e| FixError::InvalidConfig(format!("admin envelope tag {tag}: {e}")))?;
            pairs.push((tag, Bytes::from(raw)));
        }
        Message::from_pairs(begin_string, &self.msg_type, pairs, registry)
    }
}

/// Places `msg` at the top of the outbound pipeline, i.e. hands it to the
/// engine exactly as an application-originated send (spec.md §6: the admin
/// surface injects "as if" from the application, not from the wire).
pub async fn send(engine: &mut crate::client::Engine, msg: Message) -> Result<()> {
    engine.send(msg).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::tags;
    use crate::fieldmap::FieldMap;

    #[test]
    fn envelope_round_trips_through_base64_fields() {
        let mut msg = Message::new("FIX.4.4", FieldMap::list());
        msg.set(tags::MSG_TYPE, "D").unwrap();
        msg.set(tags::CL_ORD_ID, "ORD1").unwrap();

        let envelope = AdminEnvelope::from_message(&msg);
        assert_eq!(envelope.msg_type, "D");

        let registry = GroupRegistry::standard();
        let decoded = envelope.into_message("FIX.4.4", &registry).unwrap();
        assert_eq!(decoded.msg_type(), Some("D"));
        assert_eq!(decoded.get(tags::CL_ORD_ID).unwrap(), "ORD1");
    }
}
