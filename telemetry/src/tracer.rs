//! Span tracer.
//!
//! The tracer creates spans inside a [`TraceContext`]. Root spans consult the
//! sampler; children inherit the root's trace id and sampling decision. A
//! declined root yields a non-recording handle that accepts every call and
//! exports nothing.
//!
//! Every operation on a [`SpanHandle`] is infallible. Instrumentation
//! problems (calls on a stopped span, a poisoned lock) are absorbed so they
//! can never change the outcome of the instrumented code.

use crate::context::{OpenSpan, SpanContext, TraceContext};
use crate::export::ExporterRegistry;
use crate::ids::{SpanId, TraceId};
use crate::models::{Span, SpanEvent, SpanKind, SpanStatus};
use crate::resource::ResourceDescriptor;
use crate::sampler::Sampler;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Creates and records spans.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

struct TracerInner {
    resource: ResourceDescriptor,
    sampler: Arc<dyn Sampler>,
    registry: ExporterRegistry,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("service", &self.inner.resource.service_name())
            .field("sampler", &self.inner.sampler.description())
            .finish_non_exhaustive()
    }
}

impl Tracer {
    /// Creates a tracer that exports finished spans through `registry`.
    #[must_use]
    pub fn new(
        resource: ResourceDescriptor,
        sampler: Arc<dyn Sampler>,
        registry: ExporterRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(TracerInner {
                resource,
                sampler,
                registry,
            }),
        }
    }

    /// Starts a span whose parent is the current span of `cx`.
    ///
    /// With no current span this starts a new trace and consults the
    /// sampler. The new span becomes current for `cx` until it stops.
    pub fn start_span(
        &self,
        cx: &TraceContext,
        name: impl Into<String>,
        kind: SpanKind,
    ) -> SpanHandle {
        let parent = cx.current_open();
        self.start_with_parent(cx, name.into(), kind, parent)
    }

    /// Starts a span with an explicit parent, regardless of which span is
    /// current.
    pub fn start_child(
        &self,
        parent: &SpanHandle,
        name: impl Into<String>,
        kind: SpanKind,
    ) -> SpanHandle {
        let open = OpenSpan {
            context: parent.context,
            start_time: parent.start_time,
        };
        self.start_with_parent(&parent.scope, name.into(), kind, Some(open))
    }

    /// Starts a new trace in `cx`, ignoring any current span.
    pub fn start_root(
        &self,
        cx: &TraceContext,
        name: impl Into<String>,
        kind: SpanKind,
    ) -> SpanHandle {
        self.start_with_parent(cx, name.into(), kind, None)
    }

    fn start_with_parent(
        &self,
        cx: &TraceContext,
        name: String,
        kind: SpanKind,
        parent: Option<OpenSpan>,
    ) -> SpanHandle {
        let span_id = SpanId::random();
        let now = Utc::now();

        let (trace_id, sampled, parent_span_id, start_time) = match parent {
            Some(parent) => (
                parent.context.trace_id,
                parent.context.sampled,
                Some(parent.context.span_id),
                now.max(parent.start_time),
            ),
            None => {
                let trace_id = TraceId::random();
                let sampled = self.inner.sampler.should_sample(trace_id);
                (trace_id, sampled, None, now)
            }
        };

        let context = SpanContext {
            trace_id,
            span_id,
            sampled,
        };

        let recording = sampled.then(|| {
            let mut span = Span::new(trace_id, span_id, name, self.inner.resource.service_name())
                .with_kind(kind)
                .with_start_time(start_time);
            if let Some(parent_span_id) = parent_span_id {
                span = span.with_parent(parent_span_id);
            }
            Mutex::new(span)
        });

        cx.enter(context, parent_span_id, start_time);

        SpanHandle {
            context,
            start_time,
            scope: cx.clone(),
            recording,
            stopped: AtomicBool::new(false),
            registry: self.inner.registry.clone(),
        }
    }
}

/// Handle to an open span.
///
/// The span stops when [`SpanHandle::stop`] is called or when the handle is
/// dropped, whichever comes first. Stopping is idempotent.
pub struct SpanHandle {
    context: SpanContext,
    start_time: DateTime<Utc>,
    scope: TraceContext,
    recording: Option<Mutex<Span>>,
    stopped: AtomicBool,
    registry: ExporterRegistry,
}

impl std::fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanHandle")
            .field("context", &self.context)
            .field("recording", &self.is_recording())
            .finish_non_exhaustive()
    }
}

impl SpanHandle {
    /// Returns the span's identity.
    #[must_use]
    pub fn context(&self) -> SpanContext {
        self.context
    }

    /// Returns the trace id.
    #[must_use]
    pub fn trace_id(&self) -> TraceId {
        self.context.trace_id
    }

    /// Returns the span id.
    #[must_use]
    pub fn span_id(&self) -> SpanId {
        self.context.span_id
    }

    /// Returns the start time.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Returns true while the span is sampled and not yet stopped.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording.is_some() && !self.is_stopped()
    }

    /// Returns true once the span has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn lock(span: &Mutex<Span>) -> MutexGuard<'_, Span> {
        span.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_open_span(&self, f: impl FnOnce(&mut Span)) {
        if self.is_stopped() {
            return;
        }
        if let Some(recording) = &self.recording {
            let mut span = Self::lock(recording);
            if !span.is_finished() {
                f(&mut span);
            }
        }
    }

    /// Appends an event without attributes.
    pub fn add_event(&self, name: impl Into<String>) {
        self.record_event(SpanEvent::new(name));
    }

    /// Appends an event with attributes.
    pub fn add_event_with_attributes<K, V>(
        &self,
        name: impl Into<String>,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) where
        K: Into<String>,
        V: Serialize,
    {
        if !self.is_recording() {
            return;
        }
        let event = attributes
            .into_iter()
            .fold(SpanEvent::new(name), |event, (k, v)| event.with_attribute(k, v));
        self.record_event(event);
    }

    /// Appends a prepared event.
    pub fn record_event(&self, event: SpanEvent) {
        self.with_open_span(|span| span.push_event(event));
    }

    /// Upserts a tag; the last write for a key wins.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Serialize) {
        self.with_open_span(|span| span.set_tag(key, value));
    }

    /// Sets the span status.
    pub fn set_status(&self, status: SpanStatus) {
        self.with_open_span(|span| span.status = status);
    }

    /// Marks the span as failed: adds an `exception` event carrying the
    /// error message, sets the `error` tag, and sets the status to error.
    pub fn record_error(&self, error: &dyn std::error::Error) {
        self.with_open_span(|span| {
            span.push_event(
                SpanEvent::new("exception").with_attribute("exception.message", error.to_string()),
            );
            span.set_tag("error", true);
            span.status = SpanStatus::Error;
        });
    }

    /// Stops the span.
    ///
    /// Sets the end time, restores the previous current span of the unit of
    /// work, and hands a sampled span to the exporter registry. Calls after
    /// the first are no-ops.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(recording) = &self.recording {
            let finished = {
                let mut span = Self::lock(recording);
                span.finish(Utc::now()).then(|| span.clone())
            };
            match finished.map(|span| span.validate_span().map(|()| span)) {
                Some(Ok(span)) => self.registry.export_span(span),
                Some(Err(error)) => {
                    tracing::warn!(
                        trace_id = %self.context.trace_id,
                        span_id = %self.context.span_id,
                        %error,
                        "Dropping invalid span"
                    );
                }
                None => {}
            }
        }

        self.scope.exit(self.context.span_id);
    }
}

impl Drop for SpanHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
