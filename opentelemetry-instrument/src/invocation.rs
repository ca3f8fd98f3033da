use crate::baggage::{self, InvocationContext};
use crate::component::ComponentIdentity;
use crate::options::SpanOptions;
use crate::serialize::to_attribute_value;
use crate::telemetry::Telemetry;
use opentelemetry::trace::{SpanBuilder, Status, TraceContextExt};
use opentelemetry::{otel_debug, Context, ContextGuard, KeyValue};
use opentelemetry_semantic_conventions::attribute::{EXCEPTION_MESSAGE, EXCEPTION_TYPE};
use pin_project_lite::pin_project;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

/// Status message of spans whose call panicked.
const PANICKED: &str = "panicked";
/// Event added to spans whose future was dropped before it settled.
const CANCELLED: &str = "cancelled";

/// How an instrumented call ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// The call produced a value, already rendered as attribute text.
    Value(String),
    /// The call produced nothing worth recording.
    Unit,
    /// The call failed.
    Failed {
        /// Status description.
        message: String,
        /// Type of the error. When present an `exception` event is recorded.
        exception_type: Option<Cow<'static, str>>,
    },
}

impl Settlement {
    /// Settles with `value`, rendered as JSON text.
    ///
    /// Zero-sized values that serialize to `null` (`()`, unit structs) settle
    /// as [`Settlement::Unit`].
    pub fn value<T: Serialize + ?Sized>(value: &T) -> Self {
        let text = to_attribute_value(value);
        if std::mem::size_of_val(value) == 0 && text == "null" {
            Settlement::Unit
        } else {
            Settlement::Value(text)
        }
    }

    /// Settles with an error, recording it as an exception of type `E`.
    pub fn error<E: fmt::Display + ?Sized>(error: &E) -> Self {
        Settlement::Failed {
            message: error.to_string(),
            exception_type: Some(Cow::Borrowed(std::any::type_name::<E>())),
        }
    }

    /// Settles with a failure that only carries a description.
    pub fn failed(message: impl Into<String>) -> Self {
        Settlement::Failed {
            message: message.into(),
            exception_type: None,
        }
    }
}

/// One instrumented call: the span opened for it and the context the call
/// runs in.
///
/// Every way of instrumenting a call goes through an `Invocation`:
///
/// ```
/// use opentelemetry_instrument::{Invocation, Settlement, SpanOptions};
///
/// fn lookup(key: &str) -> usize {
///     let options = SpanOptions::new().with_span_name("cache.lookup");
///     let Some(invocation) = Invocation::begin(&options, "lookup") else {
///         return key.len();
///     };
///     let invocation = invocation
///         .with_arguments([opentelemetry_instrument::to_attribute_value(key)])
///         .with_component(None);
///     let found = {
///         let _guard = invocation.attach();
///         key.len()
///     };
///     invocation.settle(Settlement::value(&found));
///     found
/// }
/// # assert_eq!(lookup("abc"), 3);
/// ```
///
/// The span is closed exactly once: by [`settle`](Invocation::settle), or when
/// the invocation is dropped unsettled. Dropping it during a panic (or after
/// the call's future panicked while polled) marks the span as failed with
/// status `panicked`; dropping it otherwise adds a `cancelled` event.
pub struct Invocation {
    cx: Context,
    span_name: Cow<'static, str>,
    ended: bool,
    polling: bool,
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("span_name", &self.span_name)
            .field("span_context", self.cx.span().span_context())
            .field("ended", &self.ended)
            .finish()
    }
}

impl Invocation {
    /// Opens a span for a call of `method_name` as a child of the current
    /// context.
    ///
    /// Returns `None` when the call should run uninstrumented: telemetry is
    /// disabled, or `options` ask to skip calls while no telemetry is active.
    /// Without an active handle and without skipping, spans are created
    /// through the OpenTelemetry global tracer provider.
    pub fn begin(options: &SpanOptions, method_name: &str) -> Option<Self> {
        let current = Telemetry::current();
        let telemetry = match &current {
            Some(telemetry) => telemetry,
            None if options.skip_if_no_telemetry() => {
                otel_debug!(
                    name: "Instrument.Skipped",
                    method = method_name,
                    reason = "no active telemetry"
                );
                return None;
            }
            None => Telemetry::global_delegate(),
        };
        if !telemetry.is_enabled() {
            otel_debug!(
                name: "Instrument.Skipped",
                method = method_name,
                reason = "telemetry disabled"
            );
            return None;
        }

        let span_name: Cow<'static, str> =
            Cow::Owned(options.span_name_or(method_name).to_owned());
        let mut builder = SpanBuilder::from_name(span_name.clone());
        if let Some(kind) = options.span_kind() {
            builder = builder.with_kind(kind.clone());
        }
        let cx = Context::map_current(|parent| {
            telemetry.start_span(options.tracer_name(), builder, parent)
        });

        Some(Invocation {
            cx,
            span_name,
            ended: false,
            polling: false,
        })
    }

    /// Records positional arguments, already rendered as attribute text, as
    /// `<span name>.argument.<index>`.
    pub fn with_arguments<I>(self, arguments: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let span = self.cx.span();
        for (index, value) in arguments.into_iter().enumerate() {
            span.set_attribute(KeyValue::new(
                format!("{}.argument.{index}", self.span_name),
                value,
            ));
        }
        self
    }

    /// Copies the propagated identifiers onto the span.
    ///
    /// When the baggage names no component yet, `owner` (the identity of the
    /// instance the call belongs to) is recorded instead and merged into the
    /// baggage of the call's context, so nested instrumented calls inherit
    /// it.
    pub fn with_component(mut self, owner: Option<ComponentIdentity>) -> Self {
        let values = InvocationContext::from_context(&self.cx);
        let mut attributes = Vec::with_capacity(5);
        let mut push = |key: &'static str, value: Option<&str>| {
            if let Some(value) = value {
                attributes.push(KeyValue::new(key, value.to_owned()));
            }
        };

        push(baggage::REQUEST_ID, values.request_id());
        push(baggage::THREAD_ID, values.thread_id());
        push(baggage::RESOURCE_ID, values.resource_id());
        match (values.component_name(), owner) {
            (Some(name), _) => {
                push(baggage::COMPONENT_NAME, Some(name));
                push(baggage::RUN_ID, values.run_id());
            }
            (None, Some(identity)) => {
                push(baggage::COMPONENT_NAME, Some(identity.name()));
                push(baggage::RUN_ID, identity.run_id());

                let mut inherited = InvocationContext::default().with_component_name(identity.name);
                if let Some(run_id) = identity.run_id {
                    inherited = inherited.with_run_id(run_id);
                }
                self.cx = inherited.merge_into(&self.cx);
            }
            (None, None) => {}
        }

        let span = self.cx.span();
        for attribute in attributes {
            span.set_attribute(attribute);
        }
        self
    }

    /// The context the call runs in, with the invocation's span active.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// Makes the call's context current until the returned guard is dropped.
    #[must_use = "Dropping the guard detaches the context."]
    pub fn attach(&self) -> ContextGuard {
        self.cx.clone().attach()
    }

    /// Drives `future` in the call's context and settles the invocation with
    /// its output.
    pub fn instrument<F>(self, future: F) -> Settling<F, fn(&F::Output) -> Settlement>
    where
        F: Future,
        F::Output: crate::Settle,
    {
        Settling::new(Some(self), future, <F::Output as crate::Settle>::settlement)
    }

    /// Like [`instrument`](Invocation::instrument), deriving the settlement
    /// from the output with `settle`.
    pub fn instrument_with<F, S>(self, future: F, settle: S) -> Settling<F, S>
    where
        F: Future,
        S: FnOnce(&F::Output) -> Settlement,
    {
        Settling::new(Some(self), future, settle)
    }

    /// Records how the call ended and closes the span.
    pub fn settle(mut self, settlement: Settlement) {
        self.finish(settlement);
    }

    fn finish(&mut self, settlement: Settlement) {
        if self.ended {
            return;
        }
        self.ended = true;

        let span = self.cx.span();
        match settlement {
            Settlement::Value(value) => {
                span.set_attribute(KeyValue::new(format!("{}.result", self.span_name), value));
            }
            Settlement::Unit => {}
            Settlement::Failed {
                message,
                exception_type,
            } => {
                if let Some(exception_type) = exception_type {
                    span.add_event(
                        "exception",
                        vec![
                            KeyValue::new(EXCEPTION_MESSAGE, message.clone()),
                            KeyValue::new(EXCEPTION_TYPE, exception_type.into_owned()),
                        ],
                    );
                }
                span.set_status(Status::error(message));
            }
        }
        span.end();
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        if self.polling || std::thread::panicking() {
            self.finish(Settlement::failed(PANICKED));
        } else {
            otel_debug!(name: "Instrument.Cancelled", span = self.span_name.as_ref());
            self.cx.span().add_event(CANCELLED, Vec::new());
            self.finish(Settlement::Unit);
        }
    }
}

pin_project! {
    /// A future running in an invocation's context that settles the
    /// invocation with its output.
    ///
    /// Without an invocation it simply forwards to the inner future.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct Settling<F, S> {
        #[pin]
        inner: F,
        settle: Option<S>,
        invocation: Option<Invocation>,
    }
}

impl<F, S> Settling<F, S>
where
    F: Future,
    S: FnOnce(&F::Output) -> Settlement,
{
    /// Wraps `future`, settling `invocation` (if any) through `settle` once
    /// the future completes.
    pub fn new(invocation: Option<Invocation>, future: F, settle: S) -> Self {
        Settling {
            inner: future,
            settle: Some(settle),
            invocation,
        }
    }
}

impl<F, S> fmt::Debug for Settling<F, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settling")
            .field("invocation", &self.invocation)
            .finish()
    }
}

impl<F, S> Future for Settling<F, S>
where
    F: Future,
    S: FnOnce(&F::Output) -> Settlement,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let Some(invocation) = this.invocation.as_mut() else {
            return this.inner.poll(task_cx);
        };

        let _guard = invocation.attach();
        invocation.polling = true;
        let poll = this.inner.poll(task_cx);
        invocation.polling = false;

        if let Poll::Ready(output) = &poll {
            if let (Some(mut invocation), Some(settle)) = (this.invocation.take(), this.settle.take()) {
                invocation.finish(settle(output));
            }
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baggage::{COMPONENT_NAME, REQUEST_ID};
    use crate::config::TelemetryConfigBuilder;
    use opentelemetry::trace::{SpanKind, Status};
    use opentelemetry::Value;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};

    fn telemetry() -> (Telemetry, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let config = TelemetryConfigBuilder::default().with_disabled(false).build();
        (Telemetry::with_config(provider, config), exporter)
    }

    fn attribute<'a>(span: &'a SpanData, key: &str) -> Option<&'a Value> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    #[test]
    fn settlement_of_values() {
        assert_eq!(Settlement::value(&()), Settlement::Unit);
        assert_eq!(Settlement::value(&None::<u8>), Settlement::Value("null".into()));
        assert_eq!(Settlement::value("ok"), Settlement::Value("\"ok\"".into()));
        assert_eq!(
            Settlement::error(&std::fmt::Error),
            Settlement::Failed {
                message: "an error occurred when formatting an argument".into(),
                exception_type: Some("core::fmt::Error".into()),
            }
        );
    }

    #[test]
    fn skips_without_telemetry_when_asked() {
        let options = SpanOptions::new().with_skip_if_no_telemetry(true);
        assert!(Invocation::begin(&options, "idle").is_none());
    }

    #[test]
    fn settle_records_result_and_closes_once() {
        let (telemetry, exporter) = telemetry();
        let _guard = telemetry.attach();

        let options = SpanOptions::new()
            .with_span_name("math.add")
            .with_span_kind(SpanKind::Client);
        let invocation = Invocation::begin(&options, "add")
            .unwrap()
            .with_arguments(["1".to_owned(), "2".to_owned()])
            .with_component(None);
        assert!(invocation.context().has_active_span());
        invocation.settle(Settlement::Value("3".into()));

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "math.add");
        assert_eq!(span.span_kind, SpanKind::Client);
        assert_eq!(attribute(span, "math.add.argument.0"), Some(&Value::from("1")));
        assert_eq!(attribute(span, "math.add.argument.1"), Some(&Value::from("2")));
        assert_eq!(attribute(span, "math.add.result"), Some(&Value::from("3")));
    }

    #[test]
    fn failure_sets_status_and_exception_event() {
        let (telemetry, exporter) = telemetry();
        let _guard = telemetry.attach();

        let invocation = Invocation::begin(&SpanOptions::new(), "parse").unwrap();
        invocation.settle(Settlement::error(&std::fmt::Error));

        let spans = exporter.get_finished_spans().unwrap();
        let span = &spans[0];
        assert_eq!(
            span.status,
            Status::error("an error occurred when formatting an argument")
        );
        let event = &span.events.events[0];
        assert_eq!(event.name, "exception");
        assert!(event
            .attributes
            .iter()
            .any(|kv| kv.key.as_str() == EXCEPTION_TYPE
                && kv.value == Value::from("core::fmt::Error")));
    }

    #[test]
    fn owner_identity_is_recorded_and_inherited() {
        let (telemetry, exporter) = telemetry();
        let _guard = telemetry.attach();
        let _baggage = InvocationContext::default()
            .with_request_id("req-1")
            .attach();

        let identity = ComponentIdentity::new("planner", Some("run-3"));
        let invocation = Invocation::begin(&SpanOptions::new(), "plan")
            .unwrap()
            .with_component(identity);
        let inherited = InvocationContext::from_context(invocation.context());
        assert_eq!(inherited.component_name(), Some("planner"));
        assert_eq!(inherited.run_id(), Some("run-3"));
        assert_eq!(inherited.request_id(), Some("req-1"));
        invocation.settle(Settlement::Unit);

        let spans = exporter.get_finished_spans().unwrap();
        let span = &spans[0];
        assert_eq!(attribute(span, REQUEST_ID), Some(&Value::from("req-1")));
        assert_eq!(attribute(span, COMPONENT_NAME), Some(&Value::from("planner")));
        assert_eq!(attribute(span, "plan.result"), None);
    }

    #[test]
    fn baggage_component_wins_over_owner() {
        let (telemetry, exporter) = telemetry();
        let _guard = telemetry.attach();
        let _baggage = InvocationContext::default()
            .with_component_name("workflow")
            .attach();

        Invocation::begin(&SpanOptions::new(), "step")
            .unwrap()
            .with_component(ComponentIdentity::new("tool", None))
            .settle(Settlement::Unit);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(
            attribute(&spans[0], COMPONENT_NAME),
            Some(&Value::from("workflow"))
        );
    }

    #[test]
    fn dropped_invocation_is_cancelled() {
        let (telemetry, exporter) = telemetry();
        let _guard = telemetry.attach();

        drop(Invocation::begin(&SpanOptions::new(), "abandoned").unwrap());

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].events.events[0].name, CANCELLED);
        assert_eq!(spans[0].status, Status::Unset);
    }
}
