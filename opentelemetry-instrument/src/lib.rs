//! Automatic span instrumentation on top of the [OpenTelemetry] tracing API.
//!
//! This crate wraps function and method invocations in spans without
//! changing what callers receive. Every wrapped call:
//!
//! - starts a span (named after the method unless configured otherwise),
//! - records each positional argument as `<span>.argument.<index>` and the
//!   returned value as `<span>.result`, serialized as JSON text, falling back
//!   to `[Not Serializable]` when a value cannot be serialized,
//! - copies the correlation identifiers carried in [baggage] onto the span
//!   (`http.request_id`, `threadId`, `resourceId`, `componentName`, `runId`),
//! - establishes the owning component's identity in baggage so nested
//!   instrumented calls inherit it,
//! - closes the span exactly once, whether the call returns, fails, settles
//!   asynchronously, panics or is abandoned.
//!
//! [OpenTelemetry]: https://opentelemetry.io/docs/what-is-opentelemetry/
//! [baggage]: opentelemetry::baggage
//!
//! # Getting Started
//!
//! Register a tracer provider with a [`Telemetry`] handle, then annotate the
//! code to instrument.
//!
//! ```no_run
//! use opentelemetry_instrument::{instrument_methods, with_span, Component, Telemetry};
//! use opentelemetry_sdk::trace::SdkTracerProvider;
//!
//! struct Agent {
//!     name: String,
//! }
//!
//! impl Component for Agent {
//!     fn component_name(&self) -> Option<&str> {
//!         Some(&self.name)
//!     }
//! }
//!
//! #[instrument_methods(prefix = "agent", exclude(reset))]
//! impl Agent {
//!     fn new(name: &str) -> Self {
//!         Agent { name: name.to_string() }
//!     }
//!
//!     async fn generate(&self, prompt: String) -> Result<String, std::io::Error> {
//!         Ok(shout(&prompt))
//!     }
//!
//!     fn reset(&mut self) {}
//! }
//!
//! #[with_span(skip_if_no_telemetry)]
//! fn shout(text: &str) -> String {
//!     text.to_uppercase()
//! }
//!
//! # async fn run() {
//! let provider = SdkTracerProvider::builder().build();
//! Telemetry::new(provider).install_global();
//!
//! let agent = Agent::new("support-agent");
//! let _ = agent.generate("hello".to_string()).await;
//! # }
//! ```
//!
//! Methods that do not fit an attribute can be instrumented explicitly with
//! [`wrap_fn`], [`wrap_method`], or as a whole [`MethodTable`] through an
//! [`Instrumentor`].
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod baggage;
mod component;
pub mod config;
mod error;
mod invocation;
mod options;
mod serialize;
mod table;
mod telemetry;
mod wrap;

#[doc(hidden)]
pub mod __private;

pub use baggage::InvocationContext;
pub use component::{Component, ComponentIdentity};
pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::{InstrumentError, Result};
pub use invocation::{Invocation, Settlement, Settling};
pub use options::{InstrumentOptions, SpanOptions};
pub use serialize::{positional_arguments, to_attribute_value, Opaque, NOT_SERIALIZABLE};
pub use table::{Instrumentor, Method, MethodTable};
pub use telemetry::{has_active_telemetry, Telemetry};
pub use wrap::{wrap_fn, wrap_method, Outcome, Returned, Settle};

#[cfg(feature = "macros")]
pub use opentelemetry_instrument_macros::{instrument_methods, with_span};
