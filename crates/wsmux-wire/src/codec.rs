use serde::Serialize;
use serde_json::{Map, Value};

use crate::envelope::{is_reserved_event, Envelope, ErrorPayload, RemoteError};
use crate::error::{CodecError, Result};

/// Serialization-side view of the wire object.
///
/// Decoding is done by hand against the parsed JSON map instead,
/// because the protocol distinguishes an absent `e` from `e: null`
/// (both reject, only one carries a null value) and serde's `Option`
/// cannot make that distinction.
#[derive(Serialize)]
struct RawEnvelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    a: Option<Vec<&'a Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    c: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    i: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    d: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    e: Option<Value>,
    #[serde(rename = "_", skip_serializing_if = "Option::is_none")]
    exception: Option<u8>,
    #[serde(rename = "ws-wrapper", skip_serializing_if = "Option::is_none")]
    marker: Option<bool>,
}

impl<'a> RawEnvelope<'a> {
    fn empty() -> Self {
        Self {
            a: None,
            c: None,
            i: None,
            d: None,
            e: None,
            exception: None,
            marker: None,
        }
    }
}

/// Encode an envelope into its wire text form.
pub fn encode(envelope: &Envelope) -> Result<String> {
    let mut raw = RawEnvelope::empty();
    let event_name;

    match envelope {
        Envelope::Dispatch {
            channel,
            event,
            args,
            request_id,
        } => {
            event_name = Value::String(event.clone());
            let mut a = Vec::with_capacity(1 + args.len());
            a.push(&event_name);
            a.extend(args.iter());
            raw.a = Some(a);
            raw.c = channel.as_deref();
            raw.i = *request_id;
        }
        Envelope::Response { request_id, result } => {
            raw.i = Some(*request_id);
            match result {
                Ok(data) => raw.d = Some(data),
                Err(ErrorPayload::Exception(err)) => {
                    raw.e = Some(serde_json::to_value(err)?);
                    raw.exception = Some(1);
                }
                Err(ErrorPayload::Value(value)) => raw.e = Some(value.clone()),
            }
        }
        Envelope::Ignored => raw.marker = Some(false),
    }

    Ok(serde_json::to_string(&raw)?)
}

/// Decode wire text into an envelope.
///
/// Classification order follows the protocol: the ignore sentinel
/// first, then a dispatch (an `a` array with a string event name,
/// unless the name is reserved and no channel is given), then a
/// response (an `i` id). Anything else is unrecognized; the session
/// drops it silently.
pub fn decode(text: &str) -> Result<Envelope> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(obj) = value else {
        return Err(CodecError::NotAnObject);
    };

    if obj.get("ws-wrapper") == Some(&Value::Bool(false)) {
        return Ok(Envelope::Ignored);
    }

    let request_id = obj.get("i").and_then(Value::as_u64);

    let channel = match obj.get("c") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) if name.is_empty() => None,
        Some(Value::String(name)) => Some(name.clone()),
        Some(_) => return Err(CodecError::UnrecognizedShape),
    };

    if let Some(Value::Array(items)) = obj.get("a") {
        if !items.is_empty() {
            let Some(Value::String(event)) = items.first() else {
                return Err(CodecError::UnrecognizedShape);
            };
            // A reserved name without a channel is a lifecycle
            // notification, not a routable event; fall through to the
            // response branch like any other non-dispatch message.
            if channel.is_some() || !is_reserved_event(event) {
                return Ok(Envelope::Dispatch {
                    channel,
                    event: event.clone(),
                    args: items[1..].to_vec(),
                    request_id,
                });
            }
        }
    }

    if let Some(id) = request_id {
        if obj.contains_key("e") {
            let error = obj.get("e").cloned().unwrap_or(Value::Null);
            let payload = match (is_truthy(obj.get("_")), error) {
                (true, Value::Object(map)) => ErrorPayload::Exception(remote_error_from(map)),
                (_, other) => ErrorPayload::Value(other),
            };
            return Ok(Envelope::Response {
                request_id: id,
                result: Err(payload),
            });
        }
        let data = obj.get("d").cloned().unwrap_or(Value::Null);
        return Ok(Envelope::Response {
            request_id: id,
            result: Ok(data),
        });
    }

    Err(CodecError::UnrecognizedShape)
}

fn remote_error_from(mut fields: Map<String, Value>) -> RemoteError {
    let message = match fields.remove("message") {
        Some(Value::String(message)) => message,
        // A non-string message is coerced to its JSON text; leaving it
        // in the field map would collide with the struct field on
        // re-encode and produce a duplicate key.
        Some(other) => other.to_string(),
        None => String::new(),
    };
    RemoteError { message, fields }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
