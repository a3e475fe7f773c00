//! The ordered item collection of one session.
//!
//! [`Conversation::apply`] routes each decoded server event to the item it
//! addresses, creating items on first reference, and keeps the session-level
//! bookkeeping: the current response, pending tool calls, rate limits, usage
//! and the anomaly log.

use std::collections::HashSet;

use orca_delta::{Indexed, Merge, MergeOutcome, action, insert_at, merge_at, set_once};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Anomaly, ApiError, Error, Result};
use crate::event::{ItemEvent, OutputItemEvent, Phase, ResponseEvent, ServerEvent};
use crate::item::{Item, ItemSnapshot, ItemStatus};
use crate::types::{RateLimit, SessionResource, StatusDetails, Usage};

// ============================================================================
// Tool calls
// ============================================================================

/// A function call awaiting output from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub item_id: Option<String>,
    pub call_id: String,
    pub name: String,
    /// Arguments JSON text.
    pub arguments: String,
}

impl ToolCall {
    /// Parses the arguments JSON.
    pub fn parsed_arguments(&self) -> Result<Value> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&self.arguments)?)
    }
}

// ============================================================================
// Response state
// ============================================================================

/// Status of the exchange driven by one `response.create`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Cancelled,
    Incomplete,
    Failed,
}

impl ResponseStatus {
    /// Parses a wire status.
    pub fn from_wire(status: &str) -> Option<Self> {
        match status {
            "queued" | "in_progress" => Some(ResponseStatus::InProgress),
            "completed" => Some(ResponseStatus::Completed),
            "cancelled" => Some(ResponseStatus::Cancelled),
            "incomplete" => Some(ResponseStatus::Incomplete),
            "failed" => Some(ResponseStatus::Failed),
            _ => None,
        }
    }

    fn from_action(action: &str) -> Self {
        match action {
            "done" => ResponseStatus::Completed,
            other => ResponseStatus::from_wire(other).unwrap_or(ResponseStatus::InProgress),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseStatus::Completed
                | ResponseStatus::Cancelled
                | ResponseStatus::Incomplete
                | ResponseStatus::Failed
        )
    }

    /// The status given to unfinished items when the response ends.
    pub fn item_status(&self) -> ItemStatus {
        match self {
            ResponseStatus::Completed => ItemStatus::Completed,
            ResponseStatus::Failed => ItemStatus::Failed,
            ResponseStatus::Cancelled | ResponseStatus::Incomplete => ItemStatus::Incomplete,
            ResponseStatus::NotStarted | ResponseStatus::InProgress => ItemStatus::InProgress,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct OutputSlot {
    index: Option<usize>,
    item_id: Option<String>,
}

impl Indexed for OutputSlot {
    fn index(&self) -> Option<usize> {
        self.index
    }
}

impl Merge for OutputSlot {
    fn merge(&mut self, incoming: Self) {
        set_once(&mut self.item_id, incoming.item_id);
    }
}

/// The response currently streaming, or the last one that finished.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseState {
    id: Option<String>,
    status: ResponseStatus,
    output: Vec<OutputSlot>,
    status_details: Option<StatusDetails>,
    usage: Option<Usage>,
}

impl ResponseState {
    fn with_id(id: Option<String>) -> Self {
        Self {
            id: id.filter(|id| !id.is_empty()),
            status: ResponseStatus::InProgress,
            ..Default::default()
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    /// Output item ids by `output_index`; placeholders are `None`.
    pub fn output_item_ids(&self) -> Vec<Option<&str>> {
        self.output.iter().map(|s| s.item_id.as_deref()).collect()
    }

    pub fn status_details(&self) -> Option<&StatusDetails> {
        self.status_details.as_ref()
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    fn owns(&self, item: &Item) -> bool {
        let by_response = match (self.id.as_deref(), item.response_id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        by_response
            || item
                .id()
                .is_some_and(|id| self.output.iter().any(|s| s.item_id.as_deref() == Some(id)))
    }

    fn place(&mut self, index: Option<usize>, item_id: Option<&str>) -> Option<Anomaly> {
        let slot = OutputSlot {
            index,
            item_id: item_id.map(str::to_string),
        };
        match merge_at(&mut self.output, Some(slot)) {
            MergeOutcome::Padded { index, gap } => Some(Anomaly::IndexGap {
                item_id: item_id.map(str::to_string),
                index,
                gap,
            }),
            _ => None,
        }
    }
}

// ============================================================================
// Conversation
// ============================================================================

/// What [`Conversation::apply`] did with one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    /// The item the event was routed to.
    pub item_id: Option<String>,
    /// Session state visibly changed.
    pub changed: bool,
    /// Ordering problems observed; already logged and recorded.
    pub anomalies: Vec<Anomaly>,
    /// Function calls that became ready for output with this event.
    pub tool_calls: Vec<ToolCall>,
    /// Set when this event ended the current response.
    pub terminal: Option<ResponseStatus>,
}

/// Ordered items plus session metadata.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    id: Option<String>,
    session: Option<SessionResource>,
    items: Vec<Item>,
    response: Option<ResponseState>,
    rate_limits: Vec<RateLimit>,
    usage: Option<Usage>,
    last_error: Option<ApiError>,
    anomalies: Vec<Anomaly>,
    pending_calls: Vec<ToolCall>,
    surfaced: HashSet<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the conversation.
    ///
    /// Fails only for events that cannot be merged at all (an item with an
    /// invalid shape, an undecodable payload). Items are left as they were
    /// before the failing step; anomalies observed up to it are still
    /// logged and recorded.
    pub fn apply(&mut self, event: &ServerEvent) -> Result<Update> {
        let mut update = Update {
            item_id: event.item_id().map(str::to_string),
            ..Default::default()
        };

        let merged = match event {
            ServerEvent::Error(e) => {
                self.last_error = Some(e.api_error());
                update.changed = true;
                Ok(())
            }
            ServerEvent::Session(e) => {
                self.session = Some(e.session.clone());
                update.changed = true;
                Ok(())
            }
            ServerEvent::Conversation(e) => {
                update.changed = set_once(&mut self.id, Some(e.conversation.id.clone()));
                Ok(())
            }
            ServerEvent::Item(e) => self.apply_item_event(e, event, &mut update),
            ServerEvent::OutputItem(e) => self.apply_output_item(e, event, &mut update),
            ServerEvent::Response(e) => {
                self.apply_response(e, &mut update);
                Ok(())
            }
            ServerEvent::RateLimits(e) => {
                self.rate_limits = e.rate_limits.clone();
                update.changed = true;
                Ok(())
            }
            ServerEvent::InputAudioBuffer(_) | ServerEvent::OutputAudioBuffer(_) => Ok(()),
            _ => self.apply_to_item(event, &mut update),
        };

        // Anomalies seen before a failing step are kept.
        for anomaly in &update.anomalies {
            warn!(%anomaly, event_id = ?event.event_id(), "protocol ordering anomaly");
        }
        self.anomalies.extend(update.anomalies.iter().cloned());
        merged.map(|_| update)
    }

    /// Marks a new response as requested so that a stale terminal status
    /// from the previous response is not reported for it.
    pub fn expect_response(&mut self) {
        self.response = Some(ResponseState::default());
    }

    /// Removes and returns the pending call for `call_id`.
    pub fn resolve_tool_call(&mut self, call_id: &str) -> Result<ToolCall> {
        let pos = self
            .pending_calls
            .iter()
            .position(|c| c.call_id == call_id)
            .ok_or_else(|| Error::UnknownToolCall(call_id.to_string()))?;
        Ok(self.pending_calls.remove(pos))
    }

    /// Puts a resolved call back, e.g. when submitting its output failed.
    pub fn requeue_tool_call(&mut self, call: ToolCall) {
        if !self.is_pending_call(&call.call_id) {
            self.pending_calls.push(call);
        }
    }

    /// Returns true if `call_id` is awaiting output.
    pub fn is_pending_call(&self, call_id: &str) -> bool {
        self.pending_calls.iter().any(|c| c.call_id == call_id)
    }

    /// Drops all state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // ==================== Queries ====================

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn session(&self) -> Option<&SessionResource> {
        self.session.as_ref()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id() == Some(id))
    }

    pub fn snapshot(&self, id: &str) -> Option<ItemSnapshot> {
        self.item(id).map(Item::snapshot)
    }

    /// Snapshots of every item in conversation order.
    pub fn snapshots(&self) -> Vec<ItemSnapshot> {
        self.items.iter().map(Item::snapshot).collect()
    }

    pub fn response(&self) -> Option<&ResponseState> {
        self.response.as_ref()
    }

    pub fn response_status(&self) -> ResponseStatus {
        self.response
            .as_ref()
            .map(|r| r.status)
            .unwrap_or_default()
    }

    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        &self.pending_calls
    }

    pub fn rate_limits(&self) -> &[RateLimit] {
        &self.rate_limits
    }

    /// Usage reported by the last finished response.
    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies.len()
    }

    // ==================== Routing ====================

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.id() == Some(id))
    }

    fn apply_item_event(
        &mut self,
        e: &ItemEvent,
        event: &ServerEvent,
        update: &mut Update,
    ) -> Result<()> {
        match action(&e.tag) {
            "deleted" => {
                if let Some(pos) = e.item_id.as_deref().and_then(|id| self.position(id)) {
                    self.items.remove(pos);
                    update.changed = true;
                }
            }
            "truncated" => self.apply_to_item(event, update)?,
            _ => {
                let Some(wire) = &e.item else {
                    return Ok(());
                };
                match event.item_id().and_then(|id| self.position(id)) {
                    Some(pos) => {
                        let applied = self.items[pos].apply(event)?;
                        update.changed = applied.changed;
                        update.anomalies.extend(applied.anomalies);
                    }
                    None => {
                        let item = Item::from_wire(wire)?;
                        self.insert_item(item, e.previous_item_id.as_deref(), update);
                        update.changed = true;
                    }
                }
                if wire.item_type.as_deref() == Some("function_call_output") {
                    if let Some(call_id) = &wire.call_id {
                        self.pending_calls.retain(|c| &c.call_id != call_id);
                    }
                }
            }
        }
        Ok(())
    }

    fn insert_item(&mut self, item: Item, previous_item_id: Option<&str>, update: &mut Update) {
        let Some(previous) = previous_item_id.filter(|p| !p.is_empty()) else {
            self.items.push(item);
            return;
        };
        match self.position(previous) {
            Some(pos) => {
                insert_at(&mut self.items, pos + 1, item);
            }
            None => {
                update.anomalies.push(Anomaly::UnknownPreviousItem {
                    item_id: item.id().map(str::to_string),
                    previous_item_id: previous.to_string(),
                });
                self.items.push(item);
            }
        }
    }

    fn apply_output_item(
        &mut self,
        e: &OutputItemEvent,
        event: &ServerEvent,
        update: &mut Update,
    ) -> Result<()> {
        let item_id = event.item_id();
        let position = item_id.and_then(|id| self.position(id));

        // Fallible steps first so a rejected event leaves no trace.
        let created = match position {
            Some(pos) => {
                let applied = self.items[pos].apply(event)?;
                update.changed = applied.changed;
                update.anomalies.extend(applied.anomalies);
                None
            }
            None => {
                let mut item = Item::from_wire(&e.item)?;
                item.set_response_id(e.response_id.as_deref());
                Some(item)
            }
        };

        let response = self
            .response
            .get_or_insert_with(|| ResponseState::with_id(e.response_id.clone()));
        set_once(&mut response.id, e.response_id.clone());
        if let Some(anomaly) = response.place(e.output_index, item_id) {
            update.anomalies.push(anomaly);
        }

        let pos = match (position, created) {
            (Some(pos), _) => pos,
            (None, Some(item)) => {
                if event.phase() == Phase::Done {
                    update.anomalies.push(Anomaly::UnknownItem {
                        item_id: item_id.unwrap_or_default().to_string(),
                        tag: e.tag.clone(),
                    });
                }
                self.items.push(item);
                update.changed = true;
                self.items.len() - 1
            }
            (None, None) => return Ok(()),
        };

        if event.phase() == Phase::Done {
            self.surface_tool_call(pos, update);
        }
        Ok(())
    }

    /// Routes a content-bearing event to its item, creating a placeholder
    /// for an item that was never announced.
    fn apply_to_item(&mut self, event: &ServerEvent, update: &mut Update) -> Result<()> {
        let tag = event.tag();
        let item_id = event.item_id().map(str::to_string).or_else(|| {
            let index = event.output_index()?;
            let slot = self.response.as_ref()?.output.get(index)?;
            slot.item_id.clone()
        });
        let Some(item_id) = item_id else {
            update.anomalies.push(Anomaly::UnknownItem {
                item_id: String::new(),
                tag: tag.to_string(),
            });
            return Ok(());
        };

        let (pos, applied) = match self.position(&item_id) {
            Some(pos) => (pos, self.items[pos].apply(event)?),
            None => {
                update.anomalies.push(Anomaly::UnknownItem {
                    item_id: item_id.clone(),
                    tag: tag.to_string(),
                });
                // The placeholder joins the conversation only if the event applies.
                let mut item = Item::pending(item_id.clone());
                item.set_response_id(event.response_id());
                let applied = item.apply(event)?;
                if let (Some(response), Some(index)) = (self.response.as_mut(), event.output_index())
                {
                    if let Some(anomaly) = response.place(Some(index), Some(&item_id)) {
                        update.anomalies.push(anomaly);
                    }
                }
                self.items.push(item);
                (self.items.len() - 1, applied)
            }
        };

        update.item_id = Some(item_id);
        update.changed = applied.changed;
        update.anomalies.extend(applied.anomalies);

        if matches!(event, ServerEvent::FunctionCallArguments(_)) && event.phase() == Phase::Done {
            self.surface_tool_call(pos, update);
        }
        Ok(())
    }

    fn apply_response(&mut self, e: &ResponseEvent, update: &mut Update) {
        if !e.is_lifecycle() {
            debug!(tag = %e.tag, item_id = ?e.item_id, "response progress");
            return;
        }
        let resource = e.response.clone().unwrap_or_default();
        let status = ResponseStatus::from_wire(&resource.status)
            .unwrap_or_else(|| ResponseStatus::from_action(action(&e.tag)));
        let id = Some(resource.id.clone()).filter(|id| !id.is_empty());

        let start_new = match &self.response {
            None => true,
            Some(current) => {
                current.status.is_terminal()
                    && !(status.is_terminal() && current.id == id)
                    || matches!((&current.id, &id), (Some(a), Some(b)) if a != b)
            }
        };
        if start_new {
            self.response = Some(ResponseState::with_id(id.clone()));
        }
        let Some(response) = self.response.as_mut() else {
            return;
        };
        set_once(&mut response.id, id);

        if !status.is_terminal() {
            if response.status != status {
                response.status = status;
                update.changed = true;
            }
            return;
        }

        if response.status == status {
            return;
        }
        response.status = status;
        response.status_details = resource.status_details.clone();
        response.usage = resource.usage.clone();
        if resource.usage.is_some() {
            self.usage = resource.usage.clone();
        }
        update.changed = true;
        update.terminal = Some(status);

        for (index, wire) in resource.output.iter().enumerate() {
            let wire_id = wire.id.as_deref().filter(|id| !id.is_empty());
            if let Some(anomaly) = self
                .response
                .as_mut()
                .and_then(|r| r.place(Some(index), wire_id))
            {
                update.anomalies.push(anomaly);
            }
            let incoming = match Item::from_wire(wire) {
                Ok(item) => item,
                Err(err) => {
                    warn!(error = %err, "skipping invalid output item");
                    continue;
                }
            };
            match wire_id.and_then(|id| self.position(id)) {
                Some(pos) => self.items[pos].merge(incoming),
                None => {
                    let mut item = incoming;
                    item.set_response_id(resource.id.as_str().into());
                    self.items.push(item);
                }
            }
        }

        let Some(response) = self.response.as_ref() else {
            return;
        };
        let item_status = status.item_status();
        let mut owned = Vec::new();
        for (pos, item) in self.items.iter_mut().enumerate() {
            if response.owns(item) {
                item.finalize(item_status);
                owned.push(pos);
            }
        }
        if status == ResponseStatus::Completed {
            for pos in owned {
                self.surface_tool_call(pos, update);
            }
        }
    }

    /// Records a finished function call as pending, once per call id.
    fn surface_tool_call(&mut self, pos: usize, update: &mut Update) {
        let item = &self.items[pos];
        if !item.is_function_call() {
            return;
        }
        let Some(call_id) = item.call_id().filter(|id| !id.is_empty()) else {
            return;
        };
        if !self.surfaced.insert(call_id.to_string()) {
            return;
        }
        let call = ToolCall {
            item_id: item.id().map(str::to_string),
            call_id: call_id.to_string(),
            name: item.name().unwrap_or_default().to_string(),
            arguments: item.arguments().unwrap_or_default().to_string(),
        };
        debug!(call_id = %call.call_id, name = %call.name, "tool call ready");
        self.pending_calls.push(call.clone());
        update.tool_calls.push(call);
    }
}
