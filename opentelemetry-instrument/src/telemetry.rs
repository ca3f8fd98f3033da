use crate::config::TelemetryConfig;
use opentelemetry::global::{BoxedTracer, GlobalTracerProvider};
use opentelemetry::trace::{SpanBuilder, TraceContextExt, Tracer, TracerProvider};
use opentelemetry::{global, Context, ContextGuard, InstrumentationScope};
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Starts spans through a specific [`TracerProvider`] without naming its
/// type, mirroring the interface and returning the resulting context.
trait ObjectSafeSpanStarter {
    fn start_span(
        &self,
        tracer_name: Cow<'static, str>,
        builder: SpanBuilder,
        parent_cx: &Context,
    ) -> Context;
}

impl<S, T, P> ObjectSafeSpanStarter for P
where
    S: opentelemetry::trace::Span + Send + Sync + 'static,
    T: Tracer<Span = S>,
    P: TracerProvider<Tracer = T>,
{
    fn start_span(
        &self,
        tracer_name: Cow<'static, str>,
        builder: SpanBuilder,
        parent_cx: &Context,
    ) -> Context {
        let tracer = self.tracer(tracer_name);
        let span = builder.start_with_context(&tracer, parent_cx);
        parent_cx.with_span(span)
    }
}

/// Resolves the OpenTelemetry global tracer provider each time a tracer is
/// requested, so providers registered later are picked up.
#[derive(Debug)]
struct LateBoundGlobal;

impl TracerProvider for LateBoundGlobal {
    type Tracer = BoxedTracer;

    fn tracer_with_scope(&self, scope: InstrumentationScope) -> Self::Tracer {
        let provider: GlobalTracerProvider = global::tracer_provider();
        provider.tracer_with_scope(scope)
    }
}

/// A handle to the tracing backend used by instrumented calls.
///
/// Instrumented calls look for a handle in the current [`Context`] first
/// (see [`Telemetry::attach`]) and fall back to the one installed with
/// [`Telemetry::install_global`]. Telemetry is *active* when such a handle
/// exists and its configuration does not disable it.
#[derive(Clone)]
pub struct Telemetry {
    provider: Arc<dyn ObjectSafeSpanStarter + Send + Sync>,
    config: TelemetryConfig,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("config", &self.config)
            .finish()
    }
}

impl Telemetry {
    /// Creates a handle for `provider` with the default configuration (read
    /// from the environment).
    pub fn new<P, T, S>(provider: P) -> Self
    where
        S: opentelemetry::trace::Span + Send + Sync + 'static,
        T: Tracer<Span = S>,
        P: TracerProvider<Tracer = T> + Send + Sync + 'static,
    {
        Self::with_config(provider, TelemetryConfig::default())
    }

    /// Creates a handle for `provider` with an explicit configuration.
    pub fn with_config<P, T, S>(provider: P, config: TelemetryConfig) -> Self
    where
        S: opentelemetry::trace::Span + Send + Sync + 'static,
        T: Tracer<Span = S>,
        P: TracerProvider<Tracer = T> + Send + Sync + 'static,
    {
        Telemetry {
            provider: Arc::new(provider),
            config,
        }
    }

    /// Creates a handle that delegates to the OpenTelemetry global tracer
    /// provider, as set with [`global::set_tracer_provider`].
    ///
    /// The provider is looked up whenever a span starts. The configuration
    /// is read from the environment once per process.
    pub fn from_global() -> Self {
        Self::global_delegate().clone()
    }

    /// The shared handle behind [`Telemetry::from_global`].
    pub(crate) fn global_delegate() -> &'static Telemetry {
        static GLOBAL_DELEGATE: OnceLock<Telemetry> = OnceLock::new();
        GLOBAL_DELEGATE.get_or_init(|| Telemetry::new(LateBoundGlobal))
    }

    /// The configuration of this handle.
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Whether calls instrumented through this handle produce spans.
    pub fn is_enabled(&self) -> bool {
        !self.config.disabled
    }

    /// Returns the handle visible from the current context: the one attached
    /// to it, otherwise the globally installed one.
    pub fn current() -> Option<Telemetry> {
        Context::map_current(|cx| cx.get::<Telemetry>().cloned()).or_else(|| {
            global_telemetry()
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    /// Returns a clone of the current context carrying this handle.
    ///
    /// Useful to scope a handle to a future with `FutureExt::with_context`.
    pub fn context(&self) -> Context {
        Context::current_with_value(self.clone())
    }

    /// Makes this handle current until the returned guard is dropped.
    #[must_use = "Dropping the guard detaches the context."]
    pub fn attach(&self) -> ContextGuard {
        self.context().attach()
    }

    /// Installs this handle process-wide, returning the previously installed
    /// one.
    pub fn install_global(self) -> Option<Telemetry> {
        global_telemetry()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(self)
    }

    /// Removes the process-wide handle, returning it.
    pub fn uninstall_global() -> Option<Telemetry> {
        global_telemetry()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Starts a span from `builder` under the tracer `tracer_name` (or the
    /// configured default tracer), as a child of `parent_cx`, and returns a
    /// clone of `parent_cx` with the new span active.
    pub fn start_span(
        &self,
        tracer_name: Option<&str>,
        builder: SpanBuilder,
        parent_cx: &Context,
    ) -> Context {
        let tracer_name = match tracer_name {
            Some(name) => Cow::Owned(name.to_owned()),
            None => self.config.default_tracer_name.clone(),
        };
        self.provider.start_span(tracer_name, builder, parent_cx)
    }
}

/// Returns `true` when a [`Telemetry`] handle is visible from the current
/// context and enabled.
pub fn has_active_telemetry() -> bool {
    Telemetry::current().is_some_and(|telemetry| telemetry.is_enabled())
}

/// The process-wide telemetry slot.
fn global_telemetry() -> &'static RwLock<Option<Telemetry>> {
    static GLOBAL_TELEMETRY: OnceLock<RwLock<Option<Telemetry>>> = OnceLock::new();
    GLOBAL_TELEMETRY.get_or_init(|| RwLock::new(None))
}
