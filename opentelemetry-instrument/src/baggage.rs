//! Correlation identifiers carried in OpenTelemetry [`Baggage`].
//!
//! Instrumented calls read these entries from the current [`Context`] and
//! copy them onto their spans. Applications typically set them once at a
//! request boundary:
//!
//! ```
//! use opentelemetry_instrument::InvocationContext;
//!
//! let _guard = InvocationContext::default()
//!     .with_request_id("req-42")
//!     .with_thread_id("thread-7")
//!     .attach();
//!
//! assert_eq!(
//!     InvocationContext::current().request_id(),
//!     Some("req-42")
//! );
//! ```
use opentelemetry::baggage::{Baggage, BaggageExt, KeyValueMetadata};
use opentelemetry::{Context, ContextGuard};

/// Baggage key holding the request id. Also used as the span attribute key.
pub const REQUEST_ID: &str = "http.request_id";
/// Baggage key and span attribute key holding the component name.
pub const COMPONENT_NAME: &str = "componentName";
/// Baggage key and span attribute key holding the component run id.
pub const RUN_ID: &str = "runId";
/// Baggage key and span attribute key holding the conversation thread id.
pub const THREAD_ID: &str = "threadId";
/// Baggage key and span attribute key holding the resource id.
pub const RESOURCE_ID: &str = "resourceId";

/// The correlation identifiers of the current logical operation.
///
/// Empty baggage values are treated as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvocationContext {
    request_id: Option<String>,
    component_name: Option<String>,
    run_id: Option<String>,
    thread_id: Option<String>,
    resource_id: Option<String>,
}

impl InvocationContext {
    /// Reads the identifiers from the baggage of `cx`.
    pub fn from_context(cx: &Context) -> Self {
        let baggage = cx.baggage();
        let get = |key: &str| {
            baggage
                .get(key)
                .map(|value| value.as_str().to_owned())
                .filter(|value| !value.is_empty())
        };

        InvocationContext {
            request_id: get(REQUEST_ID),
            component_name: get(COMPONENT_NAME),
            run_id: get(RUN_ID),
            thread_id: get(THREAD_ID),
            resource_id: get(RESOURCE_ID),
        }
    }

    /// Reads the identifiers from the current context.
    pub fn current() -> Self {
        Context::map_current(Self::from_context)
    }

    /// The request id, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// The component name, if any.
    pub fn component_name(&self) -> Option<&str> {
        self.component_name.as_deref()
    }

    /// The component run id, if any.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// The thread id, if any.
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// The resource id, if any.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Sets the request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = non_empty(request_id.into());
        self
    }

    /// Sets the component name.
    pub fn with_component_name(mut self, component_name: impl Into<String>) -> Self {
        self.component_name = non_empty(component_name.into());
        self
    }

    /// Sets the component run id.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = non_empty(run_id.into());
        self
    }

    /// Sets the thread id.
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = non_empty(thread_id.into());
        self
    }

    /// Sets the resource id.
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = non_empty(resource_id.into());
        self
    }

    /// Returns a clone of `cx` whose baggage additionally carries every
    /// identifier present in `self`.
    ///
    /// Existing baggage entries are kept; entries with the same key are
    /// overwritten.
    pub fn merge_into(&self, cx: &Context) -> Context {
        let mut baggage: Baggage = cx
            .baggage()
            .iter()
            .map(|(key, (value, metadata))| {
                KeyValueMetadata::new(key.clone(), value.clone(), metadata.clone())
            })
            .collect();

        for (key, value) in self.entries() {
            let _ = baggage.insert(key, value.to_owned());
        }

        cx.with_baggage(baggage)
    }

    /// Merges these identifiers into the current context and attaches the
    /// result, restoring the previous context when the guard is dropped.
    #[must_use = "Dropping the guard detaches the context."]
    pub fn attach(&self) -> ContextGuard {
        Context::map_current(|cx| self.merge_into(cx)).attach()
    }

    fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (REQUEST_ID, self.request_id.as_deref()),
            (COMPONENT_NAME, self.component_name.as_deref()),
            (RUN_ID, self.run_id.as_deref()),
            (THREAD_ID, self.thread_id.as_deref()),
            (RESOURCE_ID, self.resource_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::{KeyValue, StringValue};

    #[test]
    fn reads_known_keys_only() {
        let cx = Context::new().with_baggage([
            KeyValue::new(REQUEST_ID, "req-1"),
            KeyValue::new(THREAD_ID, "thread-1"),
            KeyValue::new("unrelated", "x"),
        ]);

        let values = InvocationContext::from_context(&cx);
        assert_eq!(values.request_id(), Some("req-1"));
        assert_eq!(values.thread_id(), Some("thread-1"));
        assert_eq!(values.component_name(), None);
        assert_eq!(values.run_id(), None);
        assert_eq!(values.resource_id(), None);
    }

    #[test]
    fn empty_values_are_absent() {
        let cx = Context::new().with_baggage([KeyValue::new(COMPONENT_NAME, "")]);
        assert_eq!(InvocationContext::from_context(&cx).component_name(), None);

        let values = InvocationContext::default().with_run_id("");
        assert_eq!(values.run_id(), None);
    }

    #[test]
    fn merge_keeps_unrelated_entries() {
        let cx = Context::new().with_baggage([
            KeyValue::new("tenant", "acme"),
            KeyValue::new(REQUEST_ID, "req-1"),
        ]);

        let merged = InvocationContext::default()
            .with_component_name("planner")
            .with_run_id("run-1")
            .merge_into(&cx);

        let baggage = merged.baggage();
        assert_eq!(baggage.get("tenant"), Some(&StringValue::from("acme")));
        assert_eq!(baggage.get(REQUEST_ID), Some(&StringValue::from("req-1")));
        assert_eq!(
            baggage.get(COMPONENT_NAME),
            Some(&StringValue::from("planner"))
        );
        assert_eq!(baggage.get(RUN_ID), Some(&StringValue::from("run-1")));
        // the source context is immutable
        assert_eq!(cx.baggage().get(COMPONENT_NAME), None);
    }

    #[test]
    fn attach_restores_previous_context() {
        {
            let _guard = InvocationContext::default()
                .with_resource_id("doc-9")
                .attach();
            assert_eq!(InvocationContext::current().resource_id(), Some("doc-9"));
        }
        assert_eq!(InvocationContext::current(), InvocationContext::default());
    }
}
