//! Broker message envelope: `{ "name", "success"?, "data"?, "info"? }`.
//!
//! Inbound values are classified into [`MessageKind`]; replies are new values built from
//! the inbound envelope, never the inbound value mutated in place.

use crate::identity::ConnectionIdentity;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const REGISTER_APP: &str = "request.register.app";
pub const UNREGISTER_APP: &str = "request.unregister.app";
pub const BIND_APP: &str = "request.bind.app";
pub const UNBIND_APP: &str = "request.unbind.app";
pub const APP_LIST: &str = "request.app.list";
pub const FORWARD_APP_MESSAGE: &str = "forward.app.message";
pub const FORWARD_WEB_MESSAGE: &str = "forward.web.message";

/// Closed set of request kinds the broker acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    RegisterApp,
    UnregisterApp,
    BindApp,
    UnbindApp,
    AppList,
    ForwardAppMessage,
    ForwardWebMessage,
    /// Any other `name`; ignored by the broker.
    Unknown,
}

impl MessageKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            REGISTER_APP => MessageKind::RegisterApp,
            UNREGISTER_APP => MessageKind::UnregisterApp,
            BIND_APP => MessageKind::BindApp,
            UNBIND_APP => MessageKind::UnbindApp,
            APP_LIST => MessageKind::AppList,
            FORWARD_APP_MESSAGE => MessageKind::ForwardAppMessage,
            FORWARD_WEB_MESSAGE => MessageKind::ForwardWebMessage,
            _ => MessageKind::Unknown,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has no string name field")]
    MissingName,
    #[error("bind request has no data.app target")]
    MissingBindTarget,
    #[error("encoding response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One directory entry in an app-list reply: `{ "clientId", "clientInfo"? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppEntry {
    pub client_id: ConnectionIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<Value>,
}

/// A classified inbound message. Keeps the full envelope so replies can echo it and
/// forwards can relay it unmodified.
#[derive(Debug, Clone)]
pub struct Request {
    kind: MessageKind,
    body: Map<String, Value>,
}

impl Request {
    pub fn parse(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(body) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let kind = match body.get("name") {
            Some(Value::String(name)) => MessageKind::from_name(name),
            _ => return Err(ProtocolError::MissingName),
        };
        Ok(Self { kind, body })
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        self.body.get("name").and_then(Value::as_str).unwrap_or_default()
    }

    /// Registration metadata; `null` counts as absent.
    pub fn info(&self) -> Option<&Value> {
        self.body.get("info").filter(|v| !v.is_null())
    }

    /// Target app of a bind request (`data.app`).
    pub fn bind_target(&self) -> Result<ConnectionIdentity, ProtocolError> {
        self.body
            .get("data")
            .and_then(|d| d.get("app"))
            .and_then(Value::as_str)
            .map(ConnectionIdentity::from_client)
            .ok_or(ProtocolError::MissingBindTarget)
    }

    /// Success reply: the inbound envelope plus `success: true`.
    pub fn ack(&self) -> Value {
        let mut reply = self.body.clone();
        reply.insert("success".to_string(), Value::Bool(true));
        Value::Object(reply)
    }

    /// Success reply with `data` replaced.
    pub fn ack_with_data(&self, data: Value) -> Value {
        let mut reply = self.body.clone();
        reply.insert("data".to_string(), data);
        reply.insert("success".to_string(), Value::Bool(true));
        Value::Object(reply)
    }

    /// App-list reply carrying the directory snapshot.
    pub fn app_list_reply(&self, entries: &[AppEntry]) -> Result<Value, ProtocolError> {
        Ok(self.ack_with_data(serde_json::to_value(entries)?))
    }

    /// The envelope exactly as received, for relaying to the other side of a binding.
    pub fn forwarded(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

/// Unsolicited notice to a web peer that `app` is (again) bound to it.
pub fn bound_notice(app: &ConnectionIdentity) -> Value {
    json!({ "name": BIND_APP, "success": true, "data": { "app": app } })
}

/// Unsolicited notice to a web peer that `app` went away.
pub fn unbound_notice(app: &ConnectionIdentity) -> Value {
    json!({ "name": UNBIND_APP, "success": true, "data": { "app": app } })
}
