use darling::util::{Flag, PathList};
use darling::FromMeta;
use proc_macro2::TokenStream;
use quote::quote;
use syn::Expr;

/// Span kinds accepted by the `kind` option.
#[derive(Clone, Copy, Debug)]
pub(crate) enum SpanKind {
    Client,
    Server,
    Producer,
    Consumer,
    Internal,
}

impl FromMeta for SpanKind {
    fn from_string(value: &str) -> darling::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "client" => Ok(SpanKind::Client),
            "server" => Ok(SpanKind::Server),
            "producer" => Ok(SpanKind::Producer),
            "consumer" => Ok(SpanKind::Consumer),
            "internal" => Ok(SpanKind::Internal),
            _ => Err(darling::Error::unknown_value(value)),
        }
    }
}

impl SpanKind {
    fn to_tokens(self) -> TokenStream {
        let variant = match self {
            SpanKind::Client => quote!(Client),
            SpanKind::Server => quote!(Server),
            SpanKind::Producer => quote!(Producer),
            SpanKind::Consumer => quote!(Consumer),
            SpanKind::Internal => quote!(Internal),
        };
        quote!(::opentelemetry_instrument::__private::SpanKind::#variant)
    }
}

/// Arguments of `#[with_span(...)]`.
#[derive(Debug, Default, FromMeta)]
#[darling(default)]
pub(crate) struct SpanArgs {
    pub(crate) name: Option<String>,
    pub(crate) kind: Option<SpanKind>,
    pub(crate) tracer: Option<String>,
    pub(crate) skip_if_no_telemetry: Flag,
    pub(crate) filter: Option<Expr>,
}

/// Arguments of `#[instrument_methods(...)]`.
#[derive(Debug, Default, FromMeta)]
#[darling(default)]
pub(crate) struct ImplArgs {
    pub(crate) prefix: Option<String>,
    pub(crate) kind: Option<SpanKind>,
    pub(crate) tracer: Option<String>,
    pub(crate) exclude: PathList,
    pub(crate) filter: Option<Expr>,
}

impl ImplArgs {
    pub(crate) fn excludes(&self, method: &str) -> bool {
        self.exclude.iter().any(|path| path.is_ident(method))
    }

    /// The span settings of one instrumented method.
    pub(crate) fn settings_for(&self, method: &str) -> SpanSettings {
        SpanSettings {
            name: Some(match &self.prefix {
                Some(prefix) => format!("{prefix}.{method}"),
                None => method.to_owned(),
            }),
            kind: Some(self.kind.unwrap_or(SpanKind::Internal)),
            tracer: self.tracer.clone(),
            skip_if_no_telemetry: true,
            filter: self.filter.clone(),
        }
    }
}

/// Resolved options of one instrumented function.
pub(crate) struct SpanSettings {
    pub(crate) name: Option<String>,
    pub(crate) kind: Option<SpanKind>,
    pub(crate) tracer: Option<String>,
    pub(crate) skip_if_no_telemetry: bool,
    pub(crate) filter: Option<Expr>,
}

impl From<SpanArgs> for SpanSettings {
    fn from(args: SpanArgs) -> Self {
        SpanSettings {
            name: args.name,
            kind: args.kind,
            tracer: args.tracer,
            skip_if_no_telemetry: args.skip_if_no_telemetry.is_present(),
            filter: args.filter,
        }
    }
}

impl SpanSettings {
    /// Expression building the `SpanOptions` of a call.
    pub(crate) fn options(&self) -> TokenStream {
        let skip = self.skip_if_no_telemetry;
        let name = self
            .name
            .as_ref()
            .map(|name| quote!(.with_span_name(#name)));
        let kind = self.kind.map(|kind| {
            let kind = kind.to_tokens();
            quote!(.with_span_kind(#kind))
        });
        let tracer = self
            .tracer
            .as_ref()
            .map(|tracer| quote!(.with_tracer_name(#tracer)));

        quote! {
            ::opentelemetry_instrument::__private::SpanOptions::new()
                .with_skip_if_no_telemetry(#skip)
                #name
                #kind
                #tracer
        }
    }

    /// Expression deciding whether a call of `method` is instrumented.
    pub(crate) fn admits(&self, method: &str) -> TokenStream {
        match &self.filter {
            Some(filter) => quote!(::opentelemetry_instrument::__private::admits(#filter, #method)),
            None => quote!(true),
        }
    }
}
