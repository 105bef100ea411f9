//! In-memory page model used by the martech loader.
//!
//! The tree keeps just what the loader needs from a browser DOM: elements with ordered
//! attributes, text nodes, a `<head>` for script injection and a mutation observer whose
//! records are batched until the next checkpoint ([`Document::flush_mutations`]).

mod document;
pub mod error;
mod observer;

pub use document::{Document, Element, Node};
pub use error::{DomError, DomResult};
pub use observer::{MutationCallback, MutationKind, MutationObserver, MutationRecord, ObserveOptions};
