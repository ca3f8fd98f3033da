//! Tests touching the process-wide telemetry slot. They live in their own
//! test binary and run sequentially through `GLOBAL`.
mod common;

use common::{finished_spans, in_memory_telemetry};
use opentelemetry_instrument::{
    has_active_telemetry, wrap_fn, SpanOptions, Telemetry, TelemetryConfigBuilder,
};
use opentelemetry::trace::{SpanBuilder, TraceContextExt};
use opentelemetry::{global, Context};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
use std::sync::Mutex;

static GLOBAL: Mutex<()> = Mutex::new(());

fn lock() -> std::sync::MutexGuard<'static, ()> {
    GLOBAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn square() -> impl Fn((i64,)) -> Result<i64, String> {
    wrap_fn(
        "square",
        SpanOptions::new().with_skip_if_no_telemetry(true),
        |(n,): (i64,)| Ok(n * n),
    )
}

#[test]
fn installed_telemetry_is_visible_from_every_thread() {
    let _lock = lock();
    let (telemetry, exporter) = in_memory_telemetry();
    // Dropping the last handle shuts the provider down, which clears the
    // exporter.
    let _ = telemetry.clone().install_global();
    assert!(has_active_telemetry());

    let instrumented = square();
    assert_eq!(instrumented((3,)), Ok(9));
    std::thread::spawn(|| {
        assert!(has_active_telemetry());
        assert_eq!(square()((4,)), Ok(16));
    })
    .join()
    .unwrap();
    assert_eq!(finished_spans(&exporter).len(), 2);

    assert!(Telemetry::uninstall_global().is_some());
    assert!(!has_active_telemetry());
    assert_eq!(instrumented((5,)), Ok(25));
    assert_eq!(finished_spans(&exporter).len(), 2);
    drop(telemetry);
}

#[test]
fn scoped_telemetry_takes_precedence_over_global() {
    let _lock = lock();
    let (global, global_exporter) = in_memory_telemetry();
    let (scoped, scoped_exporter) = in_memory_telemetry();
    let _ = global.install_global();

    {
        let _guard = scoped.attach();
        assert_eq!(square()((2,)), Ok(4));
    }
    assert_eq!(square()((2,)), Ok(4));

    assert_eq!(finished_spans(&scoped_exporter).len(), 1);
    assert_eq!(finished_spans(&global_exporter).len(), 1);
    let _ = Telemetry::uninstall_global();
}

#[test]
fn disabled_telemetry_runs_calls_directly() {
    let _lock = lock();
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let config = TelemetryConfigBuilder::default().with_disabled(true).build();
    let _ = Telemetry::with_config(provider, config).install_global();

    assert!(!has_active_telemetry());
    let always = wrap_fn("always", SpanOptions::new(), |(n,): (i64,)| {
        Ok::<_, String>(n)
    });
    assert_eq!(always((1,)), Ok(1));
    assert!(finished_spans(&exporter).is_empty());

    let _ = Telemetry::uninstall_global();
}

#[test]
fn environment_disables_telemetry() {
    let _lock = lock();
    temp_env::with_var("OTEL_SDK_DISABLED", Some("true"), || {
        let (telemetry, exporter) = in_memory_telemetry();
        let _guard = telemetry.attach();

        assert!(!telemetry.is_enabled());
        assert_eq!(square()((6,)), Ok(36));
        assert!(finished_spans(&exporter).is_empty());
    });
}

#[test]
fn global_provider_is_resolved_when_spans_start() {
    let _lock = lock();
    let early = Telemetry::from_global();

    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    global::set_tracer_provider(provider.clone());

    let cx = early.start_span(None, SpanBuilder::from_name("late"), &Context::new());
    cx.span().end();

    let fallback = wrap_fn("fallback", SpanOptions::new(), |(n,): (i64,)| {
        Ok::<_, String>(n)
    });
    assert_eq!(fallback((1,)), Ok(1));

    let names: Vec<_> = finished_spans(&exporter)
        .into_iter()
        .map(|span| span.name.into_owned())
        .collect();
    assert_eq!(names, ["late", "fallback"]);
}
