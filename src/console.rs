//! JSON debug console for ground test.
//!
//! Requests arrive one JSON object per line over a bounded queue and are
//! answered with ACK/NACK responses on a second queue. The console can read
//! any field by name but writes only ground-writable ones, so it follows the
//! same access rules as the uplink.

use crate::bus::StateFieldBus;
use crate::field::{AnyField, AnyWritableField};
use crate::scheduler::ControlTask;
use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{error::TryRecvError, Receiver, Sender};
use tracing::{debug, warn};

pub const MAX_REQUEST_SIZE: usize = 512;
pub const MAX_RESPONSE_SIZE: usize = 1024;
const MAX_REQUESTS_PER_CYCLE: usize = 8;

pub type ResponseBuffer = ArrayString<MAX_RESPONSE_SIZE>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConsoleRequest {
    Read { id: u32, field: String },
    Write { id: u32, field: String, value: serde_json::Value },
    List { id: u32 },
}

impl ConsoleRequest {
    pub fn id(&self) -> u32 {
        match self {
            Self::Read { id, .. } | Self::Write { id, .. } | Self::List { id } => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Acknowledged,
    NegativeAck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleResponse {
    pub id: u32,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConsoleResponse {
    fn ack(id: u32) -> Self {
        Self {
            id,
            status: ResponseStatus::Acknowledged,
            field: None,
            value: None,
            message: None,
        }
    }

    fn nack(id: u32, reason: impl Into<String>) -> Self {
        Self {
            id,
            status: ResponseStatus::NegativeAck,
            field: None,
            value: None,
            message: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConsoleStats {
    pub requests: u32,
    pub nacks: u32,
    pub dropped_responses: u32,
}

pub struct DebugConsole {
    fields: HashMap<&'static str, Arc<dyn AnyField>>,
    writers: HashMap<&'static str, Arc<dyn AnyWritableField>>,
    names: Vec<&'static str>,
    rx: Receiver<String>,
    tx: Sender<String>,
    response_buffer: ResponseBuffer,
    stats: ConsoleStats,
}

impl DebugConsole {
    /// Snapshots the bus's fields; build it after everything else registered.
    pub fn new(bus: &StateFieldBus, rx: Receiver<String>, tx: Sender<String>) -> Self {
        let names = bus.field_names();
        let fields = names
            .iter()
            .filter_map(|&name| bus.field(name).map(|f| (name, f)))
            .collect();
        let writers = names
            .iter()
            .filter_map(|&name| bus.writable_field(name).map(|f| (name, f)))
            .collect();
        Self {
            fields,
            writers,
            names,
            rx,
            tx,
            response_buffer: ArrayString::new(),
            stats: ConsoleStats::default(),
        }
    }

    pub fn get_stats(&self) -> &ConsoleStats {
        &self.stats
    }

    /// Handles one request line and returns the response.
    pub fn handle_line(&mut self, line: &str) -> ConsoleResponse {
        self.stats.requests = self.stats.requests.wrapping_add(1);
        if line.len() > MAX_REQUEST_SIZE {
            return self.nack(0, "request exceeds buffer size");
        }
        let request = match serde_json::from_str::<ConsoleRequest>(line) {
            Ok(request) => request,
            Err(error) => return self.nack(0, format!("invalid request: {error}")),
        };

        match request {
            ConsoleRequest::List { id } => {
                let mut response = ConsoleResponse::ack(id);
                response.value = Some(serde_json::json!(self.names));
                response
            }
            ConsoleRequest::Read { id, field } => match self.fields.get(field.as_str()) {
                Some(f) => {
                    let mut response = ConsoleResponse::ack(id);
                    response.value = Some(f.value_json());
                    response.field = Some(field);
                    response
                }
                None => self.nack(id, format!("unknown field `{field}`")),
            },
            ConsoleRequest::Write { id, field, value } => {
                let Some(f) = self.writers.get(field.as_str()).cloned() else {
                    if self.fields.contains_key(field.as_str()) {
                        return self.nack(id, format!("field `{field}` is read-only"));
                    }
                    return self.nack(id, format!("unknown field `{field}`"));
                };
                match f.set_json(value) {
                    Ok(()) => {
                        debug!(field = f.name(), "console write");
                        let mut response = ConsoleResponse::ack(id);
                        response.value = Some(f.value_json());
                        response.field = Some(field);
                        response
                    }
                    Err(error) => self.nack(id, format!("bad value for `{field}`: {error}")),
                }
            }
        }
    }

    fn nack(&mut self, id: u32, reason: impl Into<String>) -> ConsoleResponse {
        self.stats.nacks = self.stats.nacks.wrapping_add(1);
        ConsoleResponse::nack(id, reason)
    }

    fn serialize_response(&mut self, response: &ConsoleResponse) -> Option<&str> {
        self.response_buffer.clear();
        let json = serde_json::to_string(response).ok()?;
        self.response_buffer.try_push_str(&json).ok()?;
        Some(&self.response_buffer)
    }
}

impl ControlTask for DebugConsole {
    fn name(&self) -> &'static str {
        "debug_console"
    }

    fn execute(&mut self) {
        for _ in 0..MAX_REQUESTS_PER_CYCLE {
            let line = match self.rx.try_recv() {
                Ok(line) => line,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };

            let response = self.handle_line(line.trim());
            let id = response.id;
            let Some(json) = self.serialize_response(&response).map(str::to_owned) else {
                warn!(id, "console response too large");
                self.stats.dropped_responses += 1;
                continue;
            };
            if self.tx.try_send(json).is_err() {
                self.stats.dropped_responses += 1;
            }
        }
    }
}
