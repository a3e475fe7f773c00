//! Merge primitives for reconstructing values that arrive as streamed fragments.
//!
//! Streaming APIs deliver a logical value (a message, a tool call, a transcript)
//! as a sequence of partial updates. This crate holds the small set of rules used
//! to fold those updates back into a stable value:
//!
//! - [`Delta`] accumulates `delta` fragments and lets an authoritative final
//!   value replace whatever was accumulated.
//! - [`set_once`] guards identity fields (ids, names, roles) so the first
//!   non-blank write wins.
//! - [`merge_at`] and [`insert_at`] maintain ordered collections whose
//!   fragments declare a target index.
//! - [`Router`] classifies wire tags through an ordered table of exact and
//!   prefix patterns.
//!
//! # Example
//!
//! ```rust
//! use orca_delta::{merge_at, DeltaText, Indexed, Merge, MergeOutcome};
//!
//! #[derive(Debug, Default)]
//! struct Call {
//!     index: Option<usize>,
//!     arguments: DeltaText,
//! }
//!
//! impl Indexed for Call {
//!     fn index(&self) -> Option<usize> {
//!         self.index
//!     }
//! }
//!
//! impl Merge for Call {
//!     fn merge(&mut self, incoming: Self) {
//!         self.arguments.merge(incoming.arguments);
//!     }
//! }
//!
//! let mut calls = Vec::new();
//! for fragment in ["{\"x\":", "1}"] {
//!     let call = Call {
//!         index: Some(0),
//!         arguments: DeltaText::from_delta(fragment.to_string()),
//!     };
//!     merge_at(&mut calls, Some(call));
//! }
//!
//! assert_eq!(calls.len(), 1);
//! assert_eq!(calls[0].arguments.value().map(String::as_str), Some("{\"x\":1}"));
//! ```

mod accumulate;
mod identity;
mod indexed;
mod route;

pub use accumulate::{Buffer, Delta, DeltaBytes, DeltaText};
pub use identity::{Blank, set_once};
pub use indexed::{Indexed, Merge, MergeOutcome, insert_at, merge_at};
pub use route::{Pattern, Route, Router, RouteTableError, action};

#[cfg(test)]
mod tests;
