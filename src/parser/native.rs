//! Accumulator for streamed native function-call fragments.

use std::collections::BTreeMap;

use super::{ParsedCall, RawParams};
use crate::types::{ToolCallFragment, ToolCallRecord};

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Assembles native tool calls keyed by fragment index.
///
/// The first fragment for an index opens the entry; later fragments append
/// their argument text in arrival order. Arguments are not parsed here since
/// they may be incomplete until the stream ends.
#[derive(Debug, Default)]
pub struct NativeCallAccumulator {
    calls: BTreeMap<usize, PartialCall>,
}

impl NativeCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: ToolCallFragment) {
        let entry = self.calls.entry(fragment.index).or_default();
        if entry.id.is_none() {
            entry.id = fragment.id.filter(|id| !id.is_empty());
        }
        if let Some(name) = fragment.name {
            if entry.name.is_empty() {
                entry.name = name;
            }
        }
        if let Some(arguments) = fragment.arguments {
            entry.arguments.push_str(&arguments);
        }
    }

    /// Add a call that arrived whole (non-streamed response).
    pub fn push_complete(&mut self, record: ToolCallRecord) {
        let index = self.calls.keys().next_back().map_or(0, |last| last + 1);
        self.calls.insert(
            index,
            PartialCall {
                id: Some(record.id).filter(|id| !id.is_empty()),
                name: record.name,
                arguments: record.arguments,
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Finished calls in index order. Calls without a provider id get a
    /// synthetic one so each result can be bound to its call.
    pub fn finish(self) -> Vec<ParsedCall> {
        self.calls
            .into_iter()
            .map(|(index, call)| ParsedCall {
                id: Some(call.id.unwrap_or_else(|| format!("call_{index}"))),
                name: call.name,
                params: RawParams::Arguments(call.arguments),
            })
            .collect()
    }
}
