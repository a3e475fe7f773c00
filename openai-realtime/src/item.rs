//! Conversation items.
//!
//! An [`Item`] is the mutable aggregate behind one message, function call,
//! function call output, reasoning block or code interpreter call. Streamed
//! events are folded into it with [`Item::apply`]; callers read it through
//! [`Item::snapshot`], which always renders the merged view.

use std::fmt;

use base64::Engine;
use orca_delta::{
    Blank, Buffer, Delta, DeltaBytes, DeltaText, Indexed, Merge, MergeOutcome, action, merge_at,
    set_once,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Anomaly, Error, Result};
use crate::event::{FragmentEvent, PartEvent, Phase, ServerEvent};
use crate::types::{ContentPart, ConversationItem, ErrorInfo};

// ============================================================================
// Enums
// ============================================================================

/// Item lifecycle.
///
/// `Pending -> InProgress -> Completed | Incomplete | Failed`. Terminal
/// states are never left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Referenced but not yet populated.
    #[default]
    Pending,
    InProgress,
    Completed,
    Incomplete,
    Failed,
}

impl ItemStatus {
    /// Parses a wire status.
    pub fn from_wire(status: &str) -> Option<Self> {
        match status {
            "in_progress" => Some(ItemStatus::InProgress),
            "completed" => Some(ItemStatus::Completed),
            "incomplete" => Some(ItemStatus::Incomplete),
            "failed" => Some(ItemStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
            ItemStatus::Incomplete => "incomplete",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Incomplete | ItemStatus::Failed
        )
    }

    fn rank(&self) -> u8 {
        match self {
            ItemStatus::Pending => 0,
            ItemStatus::InProgress => 1,
            _ => 2,
        }
    }
}

/// Kind of conversation item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemType {
    Message,
    FunctionCall,
    FunctionCallOutput,
    Reasoning,
    CodeInterpreterCall,
    Other(String),
}

impl ItemType {
    pub fn parse(value: &str) -> Self {
        match value {
            "message" => ItemType::Message,
            "function_call" => ItemType::FunctionCall,
            "function_call_output" => ItemType::FunctionCallOutput,
            "reasoning" => ItemType::Reasoning,
            "code_interpreter_call" => ItemType::CodeInterpreterCall,
            other => ItemType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ItemType::Message => "message",
            ItemType::FunctionCall => "function_call",
            ItemType::FunctionCallOutput => "function_call_output",
            ItemType::Reasoning => "reasoning",
            ItemType::CodeInterpreterCall => "code_interpreter_call",
            ItemType::Other(other) => other,
        }
    }
}

impl Blank for ItemType {
    fn is_blank(&self) -> bool {
        matches!(self, ItemType::Other(s) if s.is_empty())
    }
}

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    System,
    Developer,
}

impl Role {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "developer" => Ok(Role::Developer),
            other => Err(Error::InvalidItemShape(format!("unknown role {:?}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Developer => "developer",
        }
    }
}

impl Blank for Role {
    fn is_blank(&self) -> bool {
        false
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of content part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartType {
    InputText,
    InputAudio,
    InputImage,
    ItemReference,
    Text,
    Audio,
    OutputText,
    OutputAudio,
    Refusal,
    ReasoningText,
    SummaryText,
    Other(String),
}

impl PartType {
    pub fn parse(value: &str) -> Self {
        match value {
            "input_text" => PartType::InputText,
            "input_audio" => PartType::InputAudio,
            "input_image" => PartType::InputImage,
            "item_reference" => PartType::ItemReference,
            "text" => PartType::Text,
            "audio" => PartType::Audio,
            "output_text" => PartType::OutputText,
            "output_audio" => PartType::OutputAudio,
            "refusal" => PartType::Refusal,
            "reasoning_text" => PartType::ReasoningText,
            "summary_text" => PartType::SummaryText,
            other => PartType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PartType::InputText => "input_text",
            PartType::InputAudio => "input_audio",
            PartType::InputImage => "input_image",
            PartType::ItemReference => "item_reference",
            PartType::Text => "text",
            PartType::Audio => "audio",
            PartType::OutputText => "output_text",
            PartType::OutputAudio => "output_audio",
            PartType::Refusal => "refusal",
            PartType::ReasoningText => "reasoning_text",
            PartType::SummaryText => "summary_text",
            PartType::Other(other) => other,
        }
    }

    /// Returns true if a message authored by `role` may carry this part.
    /// Unknown part types are let through.
    pub fn allowed_for(&self, role: Role) -> bool {
        use PartType::*;
        match role {
            Role::User => matches!(
                self,
                InputText | InputAudio | InputImage | ItemReference | Other(_)
            ),
            Role::System | Role::Developer => {
                matches!(self, InputText | ItemReference | Other(_))
            }
            Role::Assistant => matches!(
                self,
                Text | Audio | OutputText | OutputAudio | Refusal | ItemReference | Other(_)
            ),
        }
    }
}

impl Blank for PartType {
    fn is_blank(&self) -> bool {
        matches!(self, PartType::Other(s) if s.is_empty())
    }
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Change tracking
// ============================================================================

/// Effect of a single field update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Change {
    None,
    Updated,
    /// An already settled value was replaced by a different one.
    Conflict,
}

impl Change {
    fn and(self, other: Change) -> Change {
        self.max(other)
    }
}

fn settle<T: Buffer>(field: &mut Delta<T>, value: T) -> Change {
    let was_settled = field.is_settled();
    let changed = field.settle(value);
    match (was_settled, changed) {
        (true, true) => Change::Conflict,
        (true, false) => Change::None,
        (false, _) => Change::Updated,
    }
}

fn finish<T: Buffer>(field: &mut Delta<T>) -> Change {
    if field.has_pending() {
        field.finish();
        Change::Updated
    } else {
        Change::None
    }
}

fn push<T: Buffer>(field: &mut Delta<T>, fragment: &T) -> Change {
    if fragment.is_blank() {
        return Change::None;
    }
    field.push(fragment);
    Change::Updated
}

/// Folds a field decoded from a wire object into a live field.
fn absorb_field<T: Buffer>(field: &mut Delta<T>, incoming: Delta<T>) -> Change {
    let settled = incoming.is_settled();
    match incoming.to_value().filter(|v| !v.is_blank()) {
        Some(value) if settled => settle(field, value),
        Some(value) => push(field, &value),
        None => Change::None,
    }
}

fn identity<T: Blank>(slot: &mut Option<T>, incoming: Option<T>) -> Change {
    if set_once(slot, incoming) {
        Change::Updated
    } else {
        Change::None
    }
}

fn settled_text(value: Option<&String>) -> DeltaText {
    value
        .filter(|v| !v.is_empty())
        .map(|v| DeltaText::from_settled(v.clone()))
        .unwrap_or_default()
}

/// What [`Item::apply`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    /// The merged view changed.
    pub changed: bool,
    /// Ordering problems observed while merging.
    pub anomalies: Vec<Anomaly>,
}

// ============================================================================
// Part
// ============================================================================

/// One content part or reasoning summary fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Part {
    index: Option<usize>,
    part_type: Option<PartType>,
    text: DeltaText,
    transcript: DeltaText,
    audio: DeltaBytes,
    refusal: DeltaText,
    reference_id: Option<String>,
    error: Option<ErrorInfo>,
}

impl Part {
    /// An empty part at `index`.
    pub fn at(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Default::default()
        }
    }

    /// Builds a settled part from its wire form.
    pub fn from_wire(wire: &ContentPart, index: Option<usize>) -> Result<Self> {
        let audio = match wire.audio.as_deref().filter(|a| !a.is_empty()) {
            Some(encoded) => {
                DeltaBytes::from_settled(base64::engine::general_purpose::STANDARD.decode(encoded)?)
            }
            None => DeltaBytes::new(),
        };
        Ok(Self {
            index,
            part_type: wire.part_type.as_deref().map(PartType::parse),
            text: settled_text(wire.text.as_ref()),
            transcript: settled_text(wire.transcript.as_ref()),
            audio,
            refusal: settled_text(wire.refusal.as_ref()),
            reference_id: wire.id.clone(),
            error: None,
        })
    }

    pub fn part_type(&self) -> Option<&PartType> {
        self.part_type.as_ref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.value().map(String::as_str)
    }

    pub fn transcript(&self) -> Option<&str> {
        self.transcript.value().map(String::as_str)
    }

    pub fn refusal(&self) -> Option<&str> {
        self.refusal.value().map(String::as_str)
    }

    pub fn audio(&self) -> Option<&[u8]> {
        self.audio.value().map(Vec::as_slice)
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    fn absorb(&mut self, incoming: Part) -> Change {
        identity(&mut self.part_type, incoming.part_type)
            .and(identity(&mut self.reference_id, incoming.reference_id))
            .and(absorb_field(&mut self.text, incoming.text))
            .and(absorb_field(&mut self.transcript, incoming.transcript))
            .and(absorb_field(&mut self.refusal, incoming.refusal))
            .and(absorb_field(&mut self.audio, incoming.audio))
            .and(match incoming.error {
                Some(error) if self.error.as_ref() != Some(&error) => {
                    self.error = Some(error);
                    Change::Updated
                }
                _ => Change::None,
            })
    }

    fn finish(&mut self) {
        self.text.finish();
        self.transcript.finish();
        self.refusal.finish();
        self.audio.finish();
    }

    fn reset_audio(&mut self) -> Change {
        let change = if self.audio.is_empty() && self.transcript.is_empty() {
            Change::None
        } else {
            Change::Updated
        };
        self.audio.reset();
        self.transcript.reset();
        change
    }

    pub fn snapshot(&self) -> PartSnapshot {
        PartSnapshot {
            part_type: self.part_type.as_ref().map(|t| t.as_str().to_string()),
            text: self.text.to_value(),
            transcript: self.transcript.to_value(),
            refusal: self.refusal.to_value(),
            audio: self.audio.to_value(),
            id: self.reference_id.clone(),
            error: self.error.clone(),
        }
    }
}

impl Indexed for Part {
    fn index(&self) -> Option<usize> {
        self.index
    }
}

impl Merge for Part {
    fn merge(&mut self, incoming: Self) {
        self.absorb(incoming);
    }
}

/// Merges `part` into `parts` by its index, reporting the field-level change.
fn merge_part(parts: &mut Vec<Part>, part: Part) -> (MergeOutcome, Change) {
    if let Some(index) = part.index.filter(|i| *i < parts.len()) {
        let change = parts[index].absorb(part);
        return (MergeOutcome::Merged(index), change);
    }
    (merge_at(parts, Some(part)), Change::Updated)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartList {
    Content,
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartField {
    Text,
    Transcript,
    Refusal,
}

// ============================================================================
// Item
// ============================================================================

/// A conversation item under reconstruction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    id: Option<String>,
    item_type: Option<ItemType>,
    role: Option<Role>,
    status: ItemStatus,
    content: Vec<Part>,
    summary: Vec<Part>,
    call_id: Option<String>,
    name: Option<String>,
    arguments: DeltaText,
    output: Option<String>,
    code: DeltaText,
    response_id: Option<String>,
}

impl Item {
    /// A placeholder for an item referenced before it was announced.
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Builds an item from its wire form.
    ///
    /// Messages must name a role and carry only the content types that role
    /// may author; anything else fails with [`Error::InvalidItemShape`].
    pub fn from_wire(wire: &ConversationItem) -> Result<Self> {
        let content = wire
            .content
            .iter()
            .enumerate()
            .map(|(i, part)| Part::from_wire(part, Some(i)))
            .collect::<Result<Vec<_>>>()?;
        let summary = wire
            .summary
            .iter()
            .enumerate()
            .map(|(i, part)| Part::from_wire(part, Some(i)))
            .collect::<Result<Vec<_>>>()?;

        let item = Self {
            id: wire.id.clone().filter(|id| !id.is_empty()),
            item_type: wire.item_type.as_deref().map(ItemType::parse),
            role: wire.role.as_deref().map(Role::parse).transpose()?,
            status: wire
                .status
                .as_deref()
                .and_then(ItemStatus::from_wire)
                .unwrap_or(ItemStatus::InProgress),
            content,
            summary,
            call_id: wire.call_id.clone(),
            name: wire.name.clone(),
            arguments: settled_text(wire.arguments.as_ref()),
            output: wire.output.clone(),
            code: settled_text(wire.code.as_ref()),
            response_id: None,
        };
        item.validate()?;
        Ok(item)
    }

    fn validate(&self) -> Result<()> {
        if self.item_type != Some(ItemType::Message) {
            return Ok(());
        }
        let Some(role) = self.role else {
            return Err(Error::InvalidItemShape(
                "message item without a role".to_string(),
            ));
        };
        for part in &self.content {
            if let Some(part_type) = &part.part_type {
                check_part(role, part_type)?;
            }
        }
        Ok(())
    }

    // ==================== Accessors ====================

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn item_type(&self) -> Option<&ItemType> {
        self.item_type.as_ref()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn content(&self) -> &[Part] {
        &self.content
    }

    pub fn summary(&self) -> &[Part] {
        &self.summary
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Arguments JSON text, accumulated or settled.
    pub fn arguments(&self) -> Option<&str> {
        self.arguments.value().map(String::as_str)
    }

    /// Returns true once the arguments have been settled by a done event.
    pub fn arguments_settled(&self) -> bool {
        self.arguments.is_settled()
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.value().map(String::as_str)
    }

    /// The response that produced this item, if any.
    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn is_function_call(&self) -> bool {
        self.item_type == Some(ItemType::FunctionCall)
    }

    pub(crate) fn set_response_id(&mut self, response_id: Option<&str>) {
        set_once(&mut self.response_id, response_id.map(str::to_string));
    }

    // ==================== Merging ====================

    /// Folds one server event into this item.
    ///
    /// Deltas concatenate, done events replace the accumulation with the
    /// authoritative value, identity fields keep their first non-blank value.
    /// A delta for a finished item is still appended but does not reopen it,
    /// and is reported as [`Anomaly::PostTerminalDelta`]. Repeating a done
    /// event with identical content is a no-op.
    pub fn apply(&mut self, event: &ServerEvent) -> Result<Applied> {
        let tag = event.tag();
        let phase = event.phase();
        let mut applied = Applied::default();

        let streaming = matches!(phase, Phase::Added | Phase::Delta)
            && !matches!(event, ServerEvent::Item(_) | ServerEvent::InputTranscription(_));
        if streaming && self.status.is_terminal() {
            applied.anomalies.push(Anomaly::PostTerminalDelta {
                item_id: self.id.clone(),
                tag: tag.to_string(),
            });
        }

        let mut change = match event {
            ServerEvent::Item(e) => match (&e.item, action(tag)) {
                (_, "truncated") => match self.content.get_mut(e.content_index.unwrap_or(0)) {
                    Some(part) => part.reset_audio(),
                    None => Change::None,
                },
                (Some(wire), _) => self.absorb(Item::from_wire(wire)?),
                (None, _) => Change::None,
            },
            ServerEvent::OutputItem(e) => {
                let mut incoming = Item::from_wire(&e.item)?;
                incoming.response_id = e.response_id.clone().filter(|id| !id.is_empty());
                self.absorb(incoming)
            }
            ServerEvent::ContentPart(e) => {
                self.apply_part(PartList::Content, e.content_index, e, &mut applied)?
            }
            ServerEvent::ReasoningSummaryPart(e) => {
                self.apply_part(PartList::Summary, e.summary_index, e, &mut applied)?
            }
            ServerEvent::Text(e) | ServerEvent::ReasoningText(e) => {
                self.apply_fragment(PartList::Content, e.content_index, PartField::Text, e, &mut applied)
            }
            ServerEvent::AudioTranscript(e) => self.apply_fragment(
                PartList::Content,
                e.content_index,
                PartField::Transcript,
                e,
                &mut applied,
            ),
            ServerEvent::Refusal(e) => self.apply_fragment(
                PartList::Content,
                e.content_index,
                PartField::Refusal,
                e,
                &mut applied,
            ),
            ServerEvent::ReasoningSummaryText(e) => self.apply_fragment(
                PartList::Summary,
                e.summary_index,
                PartField::Text,
                e,
                &mut applied,
            ),
            ServerEvent::Audio(e) => {
                let part = self.part_mut(PartList::Content, e.content_index, tag, &mut applied);
                match (phase, &e.audio) {
                    (Phase::Delta, Some(audio)) => push(&mut part.audio, audio),
                    (Phase::Done, _) => finish(&mut part.audio),
                    _ => Change::None,
                }
            }
            ServerEvent::FunctionCallArguments(e) => {
                identity(&mut self.item_type, Some(ItemType::FunctionCall))
                    .and(identity(&mut self.call_id, e.call_id.clone()))
                    .and(identity(&mut self.name, e.name.clone()))
                    .and(update_field(&mut self.arguments, e, phase))
            }
            ServerEvent::Code(e) => identity(&mut self.item_type, Some(ItemType::CodeInterpreterCall))
                .and(update_field(&mut self.code, e, phase)),
            ServerEvent::InputTranscription(e) => {
                let part = self.part_mut(PartList::Content, e.content_index, tag, &mut applied);
                match action(tag) {
                    "delta" => match &e.delta {
                        Some(delta) => push(&mut part.transcript, delta),
                        None => Change::None,
                    },
                    "completed" => match &e.transcript {
                        Some(transcript) => settle(&mut part.transcript, transcript.clone()),
                        None => finish(&mut part.transcript),
                    },
                    "failed" => {
                        part.error = e.error.clone();
                        Change::Updated
                    }
                    _ => Change::None,
                }
            }
            _ => Change::None,
        };

        if streaming && self.status == ItemStatus::Pending {
            self.status = ItemStatus::InProgress;
            change = change.and(Change::Updated);
        }
        if change == Change::Conflict {
            applied.anomalies.push(Anomaly::ConflictingTerminal {
                item_id: self.id.clone(),
                tag: tag.to_string(),
            });
        }
        applied.changed = change != Change::None;
        Ok(applied)
    }

    /// Ends the item with `status` unless it already finished, promoting
    /// every pending buffer to its settled value. Returns true on transition.
    pub fn finalize(&mut self, status: ItemStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.arguments.finish();
        self.code.finish();
        self.content.iter_mut().for_each(Part::finish);
        self.summary.iter_mut().for_each(Part::finish);
        true
    }

    fn absorb(&mut self, incoming: Item) -> Change {
        let mut change = identity(&mut self.id, incoming.id)
            .and(identity(&mut self.item_type, incoming.item_type))
            .and(identity(&mut self.role, incoming.role))
            .and(identity(&mut self.call_id, incoming.call_id))
            .and(identity(&mut self.name, incoming.name))
            .and(identity(&mut self.output, incoming.output))
            .and(identity(&mut self.response_id, incoming.response_id))
            .and(absorb_field(&mut self.arguments, incoming.arguments))
            .and(absorb_field(&mut self.code, incoming.code))
            .and(self.advance(incoming.status));
        for part in incoming.content {
            change = change.and(merge_part(&mut self.content, part).1);
        }
        for part in incoming.summary {
            change = change.and(merge_part(&mut self.summary, part).1);
        }
        change
    }

    fn advance(&mut self, status: ItemStatus) -> Change {
        if self.status == status {
            Change::None
        } else if self.status.is_terminal() {
            if status.is_terminal() {
                Change::Conflict
            } else {
                Change::None
            }
        } else if status.rank() > self.status.rank() {
            self.status = status;
            Change::Updated
        } else {
            Change::None
        }
    }

    fn apply_part(
        &mut self,
        list: PartList,
        index: Option<usize>,
        event: &PartEvent,
        applied: &mut Applied,
    ) -> Result<Change> {
        let part = Part::from_wire(&event.part, index)?;
        if list == PartList::Content && self.item_type == Some(ItemType::Message) {
            if let (Some(role), Some(part_type)) = (self.role, &part.part_type) {
                check_part(role, part_type)?;
            }
        }
        let parts = match list {
            PartList::Content => &mut self.content,
            PartList::Summary => &mut self.summary,
        };
        let (outcome, change) = merge_part(parts, part);
        if let MergeOutcome::Padded { index, gap } = outcome {
            applied.anomalies.push(Anomaly::IndexGap {
                item_id: self.id.clone(),
                index,
                gap,
            });
        }
        Ok(change)
    }

    fn apply_fragment(
        &mut self,
        list: PartList,
        index: Option<usize>,
        field: PartField,
        event: &FragmentEvent,
        applied: &mut Applied,
    ) -> Change {
        let phase = Phase::of(&event.tag);
        let part = self.part_mut(list, index, &event.tag, applied);
        let target = match field {
            PartField::Text => &mut part.text,
            PartField::Transcript => &mut part.transcript,
            PartField::Refusal => &mut part.refusal,
        };
        update_field(target, event, phase)
    }

    /// The part at `index`, created if it was never announced.
    fn part_mut(
        &mut self,
        list: PartList,
        index: Option<usize>,
        tag: &str,
        applied: &mut Applied,
    ) -> &mut Part {
        let index = index.unwrap_or(0);
        let parts = match list {
            PartList::Content => &mut self.content,
            PartList::Summary => &mut self.summary,
        };
        if index >= parts.len() {
            applied.anomalies.push(Anomaly::UnknownPart {
                item_id: self.id.clone(),
                index,
                tag: tag.to_string(),
            });
            if let MergeOutcome::Padded { index, gap } = merge_at(parts, Some(Part::at(index))) {
                applied.anomalies.push(Anomaly::IndexGap {
                    item_id: self.id.clone(),
                    index,
                    gap,
                });
            }
        }
        &mut parts[index]
    }

    // ==================== Snapshot ====================

    /// Renders the merged view.
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id.clone(),
            item_type: self.item_type.as_ref().map(|t| t.as_str().to_string()),
            status: self.status,
            role: self.role.map(|r| r.as_str().to_string()),
            content: self.content.iter().map(Part::snapshot).collect(),
            summary: self.summary.iter().map(Part::snapshot).collect(),
            call_id: self.call_id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.to_value(),
            output: self.output.clone(),
            code: self.code.to_value(),
        }
    }
}

impl Indexed for Item {
    fn index(&self) -> Option<usize> {
        None
    }
}

impl Merge for Item {
    fn merge(&mut self, incoming: Self) {
        self.absorb(incoming);
    }
}

fn check_part(role: Role, part_type: &PartType) -> Result<()> {
    if part_type.allowed_for(role) {
        Ok(())
    } else {
        Err(Error::InvalidItemShape(format!(
            "{} content is not allowed in a {} message",
            part_type, role
        )))
    }
}

fn update_field(field: &mut DeltaText, event: &FragmentEvent, phase: Phase) -> Change {
    match phase {
        Phase::Delta => match &event.delta {
            Some(delta) => push(field, delta),
            None => Change::None,
        },
        Phase::Done => match event.settled_value() {
            Some(value) => settle(field, value.to_string()),
            None => finish(field),
        },
        _ => Change::None,
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Immutable view of an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<PartSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub summary: Vec<PartSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ItemSnapshot {
    /// Parses the arguments JSON of a function call.
    pub fn parsed_arguments(&self) -> Result<Option<Value>> {
        match self.arguments.as_deref() {
            Some(arguments) => Ok(Some(serde_json::from_str(arguments)?)),
            None => Ok(None),
        }
    }

    /// Concatenated text of the content parts, falling back to transcripts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| p.text.as_deref().or(p.transcript.as_deref()))
            .collect()
    }
}

/// Immutable view of a content part.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartSnapshot {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub part_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    /// Decoded audio; not serialized.
    #[serde(skip)]
    pub audio: Option<Vec<u8>>,
    /// Referenced item id for item references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> ServerEvent {
        ServerEvent::from_value(value).unwrap()
    }

    #[test]
    fn test_user_message_rejects_assistant_content() {
        let wire = ConversationItem {
            item_type: Some("message".to_string()),
            role: Some("user".to_string()),
            content: vec![ContentPart {
                part_type: Some("text".to_string()),
                text: Some("hi".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            Item::from_wire(&wire),
            Err(Error::InvalidItemShape(_))
        ));
    }

    #[test]
    fn test_message_requires_role() {
        let wire = ConversationItem {
            item_type: Some("message".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Item::from_wire(&wire),
            Err(Error::InvalidItemShape(_))
        ));
    }

    #[test]
    fn test_finalize_promotes_pending_and_sticks() {
        let mut item = Item::pending("a");
        item.apply(&event(json!({
            "type": "response.function_call_arguments.delta",
            "item_id": "a",
            "call_id": "c1",
            "delta": "{}",
        })))
        .unwrap();
        assert_eq!(item.status(), ItemStatus::InProgress);
        assert!(item.finalize(ItemStatus::Incomplete));
        assert!(item.arguments_settled());
        assert!(!item.finalize(ItemStatus::Completed));
        assert_eq!(item.status(), ItemStatus::Incomplete);
    }

    #[test]
    fn test_truncate_resets_audio_and_transcript() {
        let mut item = Item::pending("a");
        item.apply(&event(json!({
            "type": "response.audio_transcript.delta",
            "item_id": "a",
            "content_index": 0,
            "delta": "hello",
        })))
        .unwrap();
        let applied = item
            .apply(&event(json!({
                "type": "conversation.item.truncated",
                "item_id": "a",
                "content_index": 0,
                "audio_end_ms": 300,
            })))
            .unwrap();
        assert!(applied.changed);
        assert_eq!(item.content()[0].transcript(), None);
    }
}
