//! Attribute macros of [`opentelemetry-instrument`].
//!
//! Use them through the re-exports of `opentelemetry_instrument`, which the
//! generated code refers to.
//!
//! [`opentelemetry-instrument`]: https://docs.rs/opentelemetry-instrument
use darling::ast::NestedMeta;
use darling::FromMeta;
use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::ext::IdentExt;
use syn::{Error, ImplItem, ItemFn, ItemImpl};

mod args;
mod expand;

use args::{ImplArgs, SpanArgs, SpanSettings};

/// Runs every call of the annotated function or method inside a span.
///
/// Options:
/// - `name = "..."`: span name, defaults to the function name.
/// - `kind = "client" | "server" | "producer" | "consumer" | "internal"`.
/// - `tracer = "..."`: tracer name, defaults to the configured default tracer.
/// - `skip_if_no_telemetry`: call the function directly, without a span, while
///   no telemetry is active.
/// - `filter = path`: a `Fn(&str) -> bool` deciding per call, from the
///   function name, whether the call is instrumented.
///
/// Works on sync functions, `async fn`, and functions returning
/// `impl Future<Output = T>` or a boxed future.
#[proc_macro_attribute]
pub fn with_span(
    attr: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    expand(attr.into(), item.into(), with_span_impl).into()
}

fn with_span_impl(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let args = SpanArgs::from_list(&NestedMeta::parse_meta_list(attr)?)?;
    let mut item: ItemFn = syn::parse2(item)?;

    let block = expand::instrument_fn(&SpanSettings::from(args), &mut item.sig, &item.block)?;
    *item.block = block;
    Ok(item.into_token_stream())
}

/// Runs every method with a receiver of the annotated `impl` block inside a
/// span named `<prefix>.<method>` (or `<method>` without a prefix).
///
/// Associated functions without a receiver, such as constructors, are left
/// alone, as are methods named in `exclude(...)`, methods the `filter`
/// rejects, and methods with their own `#[with_span]` attribute. Methods are
/// only instrumented while telemetry is active.
///
/// Options:
/// - `prefix = "..."`.
/// - `kind = "..."`: span kind, `internal` by default.
/// - `tracer = "..."`: tracer name.
/// - `exclude(a, b)`: methods to leave alone.
/// - `filter = path`: a `Fn(&str) -> bool` deciding per call, from the
///   method name, whether the call is instrumented.
#[proc_macro_attribute]
pub fn instrument_methods(
    attr: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    expand(attr.into(), item.into(), instrument_methods_impl).into()
}

fn instrument_methods_impl(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let args = ImplArgs::from_list(&NestedMeta::parse_meta_list(attr)?)?;
    let mut item: ItemImpl = syn::parse2(item).map_err(|err| {
        Error::new(
            err.span(),
            "`instrument_methods` can only be applied to an `impl` block",
        )
    })?;

    let mut errors = Vec::new();
    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let name = method.sig.ident.unraw().to_string();
        if method.sig.receiver().is_none()
            || args.excludes(&name)
            || method.attrs.iter().any(expand::is_with_span)
        {
            continue;
        }

        match expand::instrument_fn(&args.settings_for(&name), &mut method.sig, &method.block) {
            Ok(block) => method.block = block,
            Err(err) => errors.push(err),
        }
    }

    match errors.into_iter().reduce(|mut all, err| {
        all.combine(err);
        all
    }) {
        Some(err) => Err(err),
        None => Ok(item.into_token_stream()),
    }
}

fn expand(
    attr: TokenStream,
    item: TokenStream,
    f: fn(TokenStream, TokenStream) -> syn::Result<TokenStream>,
) -> TokenStream {
    f(attr, item).unwrap_or_else(Error::into_compile_error)
}
