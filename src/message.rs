//! Client and relay messages as JSON arrays.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::{event::Event, filter::Filter};

/// Message received from a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Auth(Event),
    Event(Event),
    Req { sub_id: String, filters: Vec<Filter> },
    Close(String),
}

/// Message sent to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Auth(String),
    Ok {
        id: String,
        accepted: bool,
        message: String,
    },
    Event { sub_id: String, event: Arc<Event> },
    Eose(String),
}

/// A client message that could not be understood.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a non-empty array")]
    NotArray,
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("{0} message is missing {1}")]
    Missing(&'static str, &'static str),
}

impl Inbound {
    /// Parse a text frame from a client.
    pub fn parse(txt: &str) -> Result<Self, ProtocolError> {
        let val: Value = serde_json::from_str(txt)?;
        let arr = val.as_array().filter(|a| !a.is_empty()).ok_or(ProtocolError::NotArray)?;
        let verb = arr[0].as_str().ok_or(ProtocolError::NotArray)?;
        match verb {
            "AUTH" => Ok(Inbound::Auth(event_at(arr, "AUTH")?)),
            "EVENT" => Ok(Inbound::Event(event_at(arr, "EVENT")?)),
            "REQ" => {
                let sub_id = sub_id_at(arr, "REQ")?;
                let filters = arr[2..]
                    .iter()
                    .map(|v| {
                        if v.is_object() {
                            Ok(Filter::from_value(v))
                        } else {
                            Err(ProtocolError::Missing("REQ", "filter object"))
                        }
                    })
                    .collect::<Result<_, _>>()?;
                Ok(Inbound::Req { sub_id, filters })
            }
            "CLOSE" => Ok(Inbound::Close(sub_id_at(arr, "CLOSE")?)),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

fn event_at(arr: &[Value], verb: &'static str) -> Result<Event, ProtocolError> {
    let val = arr.get(1).ok_or(ProtocolError::Missing(verb, "event"))?;
    Ok(Event::deserialize(val)?)
}

fn sub_id_at(arr: &[Value], verb: &'static str) -> Result<String, ProtocolError> {
    arr.get(1)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(ProtocolError::Missing(verb, "subscription id"))
}

impl Outbound {
    pub fn to_value(&self) -> Value {
        match self {
            Outbound::Auth(challenge) => json!(["AUTH", challenge]),
            Outbound::Ok {
                id,
                accepted,
                message,
            } => json!(["OK", id, accepted, message]),
            Outbound::Event { sub_id, event } => json!(["EVENT", sub_id, event.as_ref()]),
            Outbound::Eose(sub_id) => json!(["EOSE", sub_id]),
        }
    }

    pub fn to_text(&self) -> String {
        self.to_value().to_string()
    }
}
