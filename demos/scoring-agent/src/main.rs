//! A small agent that scores answers for unsupported claims, instrumented with
//! `opentelemetry-instrument`. Spans are printed to stdout.
//!
//! run with `$ cargo run -p scoring-agent`, set `RUST_LOG=debug` to see the
//! instrumentation's own diagnostics.
use std::collections::HashSet;
use std::error::Error;

use opentelemetry_instrument::{
    instrument_methods, with_span, Component, InvocationContext, Telemetry,
};
use opentelemetry_sdk::trace::SdkTracerProvider;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[derive(Debug, Serialize)]
struct Case {
    id: &'static str,
    context: &'static str,
    answer: &'static str,
}

#[derive(Debug, Serialize)]
struct Score {
    /// Share of answer terms that the context does not mention.
    unsupported: f64,
    verdict: &'static str,
}

struct ScoringAgent {
    name: String,
    run_id: String,
    threshold: f64,
}

impl Component for ScoringAgent {
    fn component_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn run_id(&self) -> Option<&str> {
        Some(&self.run_id)
    }
}

#[instrument_methods(prefix = "scorer", exclude(describe))]
impl ScoringAgent {
    fn new(name: &str, threshold: f64) -> Self {
        ScoringAgent {
            name: name.to_string(),
            run_id: format!("{name}-run-1"),
            threshold,
        }
    }

    async fn evaluate(&self, case: &Case) -> Result<Score, String> {
        if case.answer.trim().is_empty() {
            return Err(format!("case {} has an empty answer", case.id));
        }
        tokio::task::yield_now().await;
        let unsupported = 1.0 - overlap(case.context, case.answer);
        Ok(self.judge(unsupported))
    }

    fn judge(&self, unsupported: f64) -> Score {
        let verdict = if unsupported > self.threshold {
            "hallucinated"
        } else {
            "grounded"
        };
        Score {
            unsupported,
            verdict,
        }
    }

    fn describe(&self) -> String {
        format!("{} (threshold {})", self.name, self.threshold)
    }
}

/// Fraction of the answer's terms that also appear in the context.
#[with_span(name = "scorer.overlap", skip_if_no_telemetry)]
fn overlap(context: &str, answer: &str) -> f64 {
    let known: HashSet<String> = terms(context).collect();
    let (mut total, mut hits) = (0usize, 0usize);
    for term in terms(answer) {
        total += 1;
        if known.contains(&term) {
            hits += 1;
        }
    }
    if total == 0 {
        return 1.0;
    }
    hits as f64 / total as f64
}

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() > 3)
        .map(str::to_lowercase)
}

fn init_tracer_provider() -> SdkTracerProvider {
    let exporter = opentelemetry_stdout::SpanExporter::default();
    SdkTracerProvider::builder()
        .with_simple_exporter(exporter)
        .build()
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    init_logging();
    let provider = init_tracer_provider();
    let _ = Telemetry::new(provider.clone()).install_global();

    let agent = ScoringAgent::new("faithfulness-scorer", 0.5);
    info!(agent = %agent.describe(), "scoring started");

    let cases = [
        Case {
            id: "capital",
            context: "Paris is the capital and largest city of France.",
            answer: "Paris is the capital of France.",
        },
        Case {
            id: "moon",
            context: "The Apollo program landed twelve astronauts on the Moon.",
            answer: "Astronauts planted potatoes during lunar expeditions.",
        },
        Case {
            id: "blank",
            context: "Nothing to see here.",
            answer: "",
        },
    ];

    for case in &cases {
        let _baggage = InvocationContext::default()
            .with_request_id(format!("req-{}", case.id))
            .with_resource_id(case.id)
            .attach();
        match agent.evaluate(case).await {
            Ok(score) => info!(
                case = case.id,
                unsupported = score.unsupported,
                verdict = score.verdict,
                "case scored"
            ),
            Err(err) => info!(case = case.id, error = %err, "case rejected"),
        }
    }

    let _ = Telemetry::uninstall_global();
    provider.shutdown()?;
    Ok(())
}
