//! Delta accumulation for text-like and byte-like fields.

use crate::identity::Blank;
use crate::indexed::Merge;

/// A value that can be grown by appending fragments of the same type.
pub trait Buffer: Blank + Default + Clone + PartialEq {
    /// Appends `fragment` to the end of `self`.
    fn extend_from(&mut self, fragment: &Self);
}

impl Buffer for String {
    fn extend_from(&mut self, fragment: &Self) {
        self.push_str(fragment);
    }
}

impl Buffer for Vec<u8> {
    fn extend_from(&mut self, fragment: &Self) {
        self.extend_from_slice(fragment);
    }
}

/// A field that receives incremental fragments and, eventually, a final value.
///
/// Two slots are kept: `pending` holds the concatenation of every fragment seen
/// so far, `settled` holds the last authoritative value. [`Delta::value`]
/// exposes the pending buffer if there is one, otherwise the settled value.
///
/// Settling replaces the accumulation instead of appending to it, so observing
/// both the fragments and the final value never double-counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta<T> {
    settled: Option<T>,
    pending: Option<T>,
}

/// Accumulated text (arguments JSON, transcripts, refusals, code, reasoning).
pub type DeltaText = Delta<String>;

/// Accumulated binary payload (decoded audio).
pub type DeltaBytes = Delta<Vec<u8>>;

impl<T> Default for Delta<T> {
    fn default() -> Self {
        Self {
            settled: None,
            pending: None,
        }
    }
}

impl<T: Buffer> Delta<T> {
    /// Creates an empty field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a field holding a single unsettled fragment.
    pub fn from_delta(fragment: T) -> Self {
        Self {
            settled: None,
            pending: Some(fragment),
        }
    }

    /// Creates a field holding a final value.
    pub fn from_settled(value: T) -> Self {
        Self {
            settled: Some(value),
            pending: None,
        }
    }

    /// Appends a fragment.
    ///
    /// The first fragment after a settled value continues from that value.
    pub fn push(&mut self, fragment: &T) {
        let settled = &self.settled;
        self.pending
            .get_or_insert_with(|| settled.clone().unwrap_or_default())
            .extend_from(fragment);
    }

    /// Replaces the accumulation with an authoritative value.
    ///
    /// Returns `true` if the visible value changed.
    pub fn settle(&mut self, value: T) -> bool {
        let changed = self.value() != Some(&value);
        self.settled = Some(value);
        self.pending = None;
        changed
    }

    /// Promotes the pending buffer to the settled value.
    ///
    /// Used for "done" events that carry no payload of their own.
    pub fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.settled = Some(pending);
        }
    }

    /// Clears both the pending buffer and the settled value.
    pub fn reset(&mut self) {
        self.settled = None;
        self.pending = None;
    }

    /// Returns the pending buffer if present, else the settled value.
    pub fn value(&self) -> Option<&T> {
        self.pending.as_ref().or(self.settled.as_ref())
    }

    /// Returns an owned copy of [`Delta::value`].
    pub fn to_value(&self) -> Option<T> {
        self.value().cloned()
    }

    /// Returns true once a final value has been applied and no fragment followed it.
    pub fn is_settled(&self) -> bool {
        self.settled.is_some() && self.pending.is_none()
    }

    /// Returns true if nothing, or only blank content, has been received.
    pub fn is_empty(&self) -> bool {
        self.value().is_none_or(Blank::is_blank)
    }

    /// Returns true if a fragment has been received that is not yet settled.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T: Buffer> Merge for Delta<T> {
    fn merge(&mut self, incoming: Self) {
        if let Some(value) = incoming.settled {
            self.settle(value);
        }
        if let Some(fragment) = incoming.pending {
            self.push(&fragment);
        }
    }
}

impl From<&str> for Delta<String> {
    fn from(value: &str) -> Self {
        Self::from_settled(value.to_string())
    }
}
