//! Per-unit-of-work trace context.
//!
//! A [`TraceContext`] is created for each unit of work (one inbound request,
//! one CLI invocation) and passed explicitly to every span creation and log
//! emission made on its behalf. Two requests never share a context, so the
//! "current span" of one can never leak into the other.
//!
//! The context tracks the still-open spans in creation order together with
//! the parent link of every span created through it. When the current span
//! stops, the nearest still-open ancestor becomes current again. Stopping
//! spans out of order is allowed. Parent links are kept only while an open
//! span can still walk through them.

use crate::ids::{SpanId, TraceId};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identity of a span as seen by its children and by log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    /// Trace the span belongs to.
    pub trace_id: TraceId,
    /// The span's own id.
    pub span_id: SpanId,
    /// Whether the trace was selected by the sampler.
    pub sampled: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenSpan {
    pub(crate) context: SpanContext,
    pub(crate) start_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ScopeState {
    open: Vec<OpenSpan>,
    parents: HashMap<SpanId, Option<SpanId>>,
    current: Option<SpanId>,
}

impl ScopeState {
    fn find_open(&self, span_id: SpanId) -> Option<&OpenSpan> {
        self.open.iter().find(|s| s.context.span_id == span_id)
    }

    fn is_open(&self, span_id: SpanId) -> bool {
        self.find_open(span_id).is_some()
    }

    fn nearest_open_ancestor(&self, span_id: SpanId) -> Option<SpanId> {
        let mut next = self.parents.get(&span_id).copied().flatten();
        while let Some(candidate) = next {
            if self.is_open(candidate) {
                return Some(candidate);
            }
            next = self.parents.get(&candidate).copied().flatten();
        }
        None
    }

    /// Drops the parent links no open span can reach anymore.
    fn prune_parents(&mut self) {
        if self.open.is_empty() {
            self.parents.clear();
            return;
        }
        let mut reachable = HashSet::new();
        for open in &self.open {
            let mut next = Some(open.context.span_id);
            while let Some(id) = next {
                if !reachable.insert(id) {
                    break;
                }
                next = self.parents.get(&id).copied().flatten();
            }
        }
        self.parents.retain(|id, _| reachable.contains(id));
    }
}

/// Trace context of one unit of work.
///
/// Cloning yields another handle to the same unit of work.
#[derive(Debug, Clone, Default)]
pub struct TraceContext {
    state: Arc<Mutex<ScopeState>>,
}

impl TraceContext {
    /// Creates an empty context for a new unit of work.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current span, if one is open.
    #[must_use]
    pub fn current(&self) -> Option<SpanContext> {
        self.current_open().map(|s| s.context)
    }

    /// Returns the trace id of the current span.
    #[must_use]
    pub fn trace_id(&self) -> Option<TraceId> {
        self.current().map(|c| c.trace_id)
    }

    /// Returns the id of the current span.
    #[must_use]
    pub fn current_span_id(&self) -> Option<SpanId> {
        self.current().map(|c| c.span_id)
    }

    /// Returns the ids of all still-open spans, in creation order.
    #[must_use]
    pub fn open_span_ids(&self) -> Vec<SpanId> {
        self.lock().open.iter().map(|s| s.context.span_id).collect()
    }

    /// Returns true if no span is open in this unit of work.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock().open.is_empty()
    }

    pub(crate) fn current_open(&self) -> Option<OpenSpan> {
        let state = self.lock();
        state.current.and_then(|id| state.find_open(id)).copied()
    }

    pub(crate) fn enter(
        &self,
        context: SpanContext,
        parent: Option<SpanId>,
        start_time: DateTime<Utc>,
    ) {
        let mut state = self.lock();
        state.parents.insert(context.span_id, parent);
        state.open.push(OpenSpan {
            context,
            start_time,
        });
        state.current = Some(context.span_id);
    }

    pub(crate) fn exit(&self, span_id: SpanId) {
        let mut state = self.lock();
        let Some(position) = state
            .open
            .iter()
            .position(|s| s.context.span_id == span_id)
        else {
            return;
        };
        state.open.remove(position);

        if state.current == Some(span_id) {
            state.current = state
                .nearest_open_ancestor(span_id)
                .or_else(|| state.open.last().map(|s| s.context.span_id));
        }
        state.prune_parents();
    }

    #[cfg(test)]
    fn parent_links(&self) -> usize {
        self.lock().parents.len()
    }
}
