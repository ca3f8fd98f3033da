use opentelemetry::trace::SpanKind;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Options for wrapping a single function or method in a span.
///
/// ```
/// use opentelemetry::trace::SpanKind;
/// use opentelemetry_instrument::SpanOptions;
///
/// let options = SpanOptions::new()
///     .with_span_name("scorer.run")
///     .with_span_kind(SpanKind::Client)
///     .with_tracer_name("evals")
///     .with_skip_if_no_telemetry(true);
/// assert_eq!(options.span_name_or("run"), "scorer.run");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpanOptions {
    span_name: Option<Cow<'static, str>>,
    skip_if_no_telemetry: bool,
    span_kind: Option<SpanKind>,
    tracer_name: Option<Cow<'static, str>>,
}

impl SpanOptions {
    /// Options with every field unset: the span is named after the method,
    /// has the tracer's default kind, comes from the default tracer, and is
    /// created even if no telemetry is active.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the span explicitly instead of after the method.
    pub fn with_span_name(mut self, span_name: impl Into<Cow<'static, str>>) -> Self {
        self.span_name = Some(span_name.into());
        self
    }

    /// Calls the wrapped callable directly, without a span or any context
    /// change, when no telemetry is active.
    pub fn with_skip_if_no_telemetry(mut self, skip: bool) -> Self {
        self.skip_if_no_telemetry = skip;
        self
    }

    /// Sets the kind of the created span.
    pub fn with_span_kind(mut self, span_kind: SpanKind) -> Self {
        self.span_kind = Some(span_kind);
        self
    }

    /// Obtains the span's tracer under this name instead of the default one.
    pub fn with_tracer_name(mut self, tracer_name: impl Into<Cow<'static, str>>) -> Self {
        self.tracer_name = Some(tracer_name.into());
        self
    }

    /// The configured span name, or `method_name` when none is set.
    pub fn span_name_or<'a>(&'a self, method_name: &'a str) -> &'a str {
        self.span_name.as_deref().unwrap_or(method_name)
    }

    /// Whether instrumentation is skipped when no telemetry is active.
    pub fn skip_if_no_telemetry(&self) -> bool {
        self.skip_if_no_telemetry
    }

    /// The configured span kind.
    pub fn span_kind(&self) -> Option<&SpanKind> {
        self.span_kind.as_ref()
    }

    /// The configured tracer name.
    pub fn tracer_name(&self) -> Option<&str> {
        self.tracer_name.as_deref()
    }
}

type MethodFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Options for instrumenting every method of a [`MethodTable`].
///
/// Methods get the span name `<prefix>.<method>` (or `<method>` without a
/// prefix), the configured span kind ([`SpanKind::Internal`] by default), and
/// are only instrumented while telemetry is active.
///
/// [`MethodTable`]: crate::MethodTable
#[derive(Clone, Default)]
pub struct InstrumentOptions {
    pub(crate) prefix: Option<Cow<'static, str>>,
    pub(crate) span_kind: Option<SpanKind>,
    pub(crate) exclude_methods: HashSet<String>,
    pub(crate) method_filter: Option<MethodFilter>,
    pub(crate) tracer_name: Option<Cow<'static, str>>,
}

impl fmt::Debug for InstrumentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentOptions")
            .field("prefix", &self.prefix)
            .field("span_kind", &self.span_kind)
            .field("exclude_methods", &self.exclude_methods)
            .field("method_filter", &self.method_filter.is_some())
            .field("tracer_name", &self.tracer_name)
            .finish()
    }
}

impl InstrumentOptions {
    /// Default options: no prefix, internal spans, nothing excluded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes every span name with `<prefix>.`.
    pub fn with_prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the kind of every created span.
    pub fn with_span_kind(mut self, span_kind: SpanKind) -> Self {
        self.span_kind = Some(span_kind);
        self
    }

    /// Leaves the named methods uninstrumented.
    pub fn with_excluded_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_methods
            .extend(methods.into_iter().map(Into::into));
        self
    }

    /// Only instruments methods for which `filter` returns `true`.
    pub fn with_method_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.method_filter = Some(Arc::new(filter));
        self
    }

    /// Obtains span tracers under this name instead of the default one.
    pub fn with_tracer_name(mut self, tracer_name: impl Into<Cow<'static, str>>) -> Self {
        self.tracer_name = Some(tracer_name.into());
        self
    }

    /// Whether `method` is instrumented under these options.
    pub fn includes(&self, method: &str) -> bool {
        !self.exclude_methods.contains(method)
            && self.method_filter.as_ref().map_or(true, |filter| filter(method))
    }

    /// The span options applied to `method`.
    pub fn span_options(&self, method: &str) -> SpanOptions {
        let span_name = match &self.prefix {
            Some(prefix) => format!("{prefix}.{method}"),
            None => method.to_owned(),
        };
        let options = SpanOptions::new()
            .with_span_name(span_name)
            .with_skip_if_no_telemetry(true)
            .with_span_kind(self.span_kind.clone().unwrap_or(SpanKind::Internal));

        match &self.tracer_name {
            Some(tracer_name) => options.with_tracer_name(tracer_name.clone()),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_name_falls_back_to_method() {
        assert_eq!(SpanOptions::new().span_name_or("lookup"), "lookup");
        assert_eq!(
            SpanOptions::new()
                .with_span_name("cache.lookup")
                .span_name_or("lookup"),
            "cache.lookup"
        );
    }

    #[test]
    fn method_span_options() {
        let options = InstrumentOptions::new()
            .with_prefix("memory")
            .with_tracer_name("storage");

        let span = options.span_options("query");
        assert_eq!(span.span_name_or("query"), "memory.query");
        assert!(span.skip_if_no_telemetry());
        assert_eq!(span.span_kind(), Some(&SpanKind::Internal));
        assert_eq!(span.tracer_name(), Some("storage"));

        let span = InstrumentOptions::new()
            .with_span_kind(SpanKind::Client)
            .span_options("query");
        assert_eq!(span.span_name_or("other"), "query");
        assert_eq!(span.span_kind(), Some(&SpanKind::Client));
        assert_eq!(span.tracer_name(), None);
    }

    #[test]
    fn exclusion_and_filter() {
        let options = InstrumentOptions::new()
            .with_excluded_methods(["reset"])
            .with_method_filter(|name| !name.starts_with('_'));

        assert!(options.includes("query"));
        assert!(!options.includes("reset"));
        assert!(!options.includes("_flush"));
    }
}
