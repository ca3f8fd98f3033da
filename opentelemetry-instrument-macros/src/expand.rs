use crate::args::SpanSettings;
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote, quote_spanned};
use syn::ext::IdentExt;
use syn::spanned::Spanned;
use syn::{
    Block, Error, FnArg, GenericArgument, Pat, PatIdent, PathArguments, ReturnType, Signature,
    Type, TypeParamBound,
};

/// What a function hands back to its caller.
enum Output<'a> {
    /// An `async fn` resolving to the declared type.
    Async(Option<&'a Type>),
    /// A future returned as `impl Future<Output = T>`.
    ImplFuture(Option<&'a Type>),
    /// A future returned boxed: `Pin<Box<dyn Future<Output = T>>>` or
    /// `BoxFuture<'_, T>`.
    BoxedFuture(Option<&'a Type>),
    /// A value returned immediately.
    Value(Option<&'a Type>),
}

/// Rewrites the body of a function so that every call runs inside a span.
///
/// Patterned parameters are renamed so their values can be recorded before
/// the body destructures them; the signature is otherwise kept as is.
pub(crate) fn instrument_fn(
    settings: &SpanSettings,
    sig: &mut Signature,
    block: &Block,
) -> syn::Result<Block> {
    if let Some(constness) = &sig.constness {
        return Err(Error::new(
            constness.span(),
            "`const fn` cannot be instrumented",
        ));
    }

    let method_name = sig.ident.unraw().to_string();
    let mut receiver = None;
    let mut arguments = Vec::new();
    let mut destructure = Vec::new();

    for (index, input) in sig.inputs.iter_mut().enumerate() {
        match input {
            FnArg::Receiver(recv) => {
                let by_value_self = recv.reference.is_none()
                    && matches!(&*recv.ty, Type::Path(path) if path.path.is_ident("Self"));
                receiver = Some(if by_value_self {
                    quote!(&self)
                } else {
                    quote!(&*self)
                });
            }
            FnArg::Typed(typed) => {
                let ident = match &*typed.pat {
                    Pat::Ident(PatIdent {
                        ident,
                        by_ref: None,
                        subpat: None,
                        ..
                    }) => ident.clone(),
                    pat => {
                        let ident = format_ident!("__otel_arg{}", index);
                        destructure.push(quote!(let #pat = #ident;));
                        *typed.pat = Pat::Ident(PatIdent {
                            attrs: Vec::new(),
                            by_ref: None,
                            mutability: None,
                            ident: ident.clone(),
                            subpat: None,
                        });
                        ident
                    }
                };
                arguments.push(quote_spanned! {ident.span()=>
                    (&&::opentelemetry_instrument::__private::Probe(&#ident)).attribute_value()
                });
            }
        }
    }

    let identity = match receiver {
        Some(receiver) => quote! {
            (&&::opentelemetry_instrument::__private::Probe(#receiver)).component_identity()
        },
        None => quote!(::std::option::Option::None),
    };
    let options = settings.options();
    let admits = settings.admits(&method_name);

    let prologue = quote! {
        #[allow(unused_imports)]
        use ::opentelemetry_instrument::__private::{
            ComponentReceiver as _, DebugError as _, DisplayError as _, OpaqueError as _,
            OpaqueValue as _, PlainReceiver as _, SerializeValue as _,
        };
        let __otel_options = #options;
        let __otel_invocation = if #admits {
            ::opentelemetry_instrument::__private::Invocation::begin(&__otel_options, #method_name)
        } else {
            ::std::option::Option::None
        };
        let __otel_invocation = match __otel_invocation {
            ::std::option::Option::Some(__otel_invocation) => ::std::option::Option::Some(
                __otel_invocation
                    .with_arguments(::std::vec![#(#arguments),*])
                    .with_component(#identity),
            ),
            ::std::option::Option::None => ::std::option::Option::None,
        };
    };

    let stmts = &block.stmts;
    let output = classify(sig);
    let boxed = matches!(output, Output::BoxedFuture(_));
    let body = match output {
        Output::Async(output) => {
            let fake_return = fake_return(output);
            let settle = settle(output);
            quote! {
                ::opentelemetry_instrument::__private::Settling::new(
                    __otel_invocation,
                    async move {
                        #fake_return
                        #(#destructure)*
                        #(#stmts)*
                    },
                    |__otel_ret| #settle,
                )
                .await
            }
        }
        Output::ImplFuture(output) | Output::BoxedFuture(output) => {
            let fake_return = match &sig.output {
                ReturnType::Type(_, ty) if boxed => fake_return(Some(ty)),
                _ => TokenStream::new(),
            };
            let settle = settle(output);
            let fix_output = match output {
                Some(ty) if !contains_impl_trait(ty) => quote! {
                    let __otel_future =
                        ::opentelemetry_instrument::__private::with_output::<#ty, _>(__otel_future);
                },
                _ => TokenStream::new(),
            };
            let settling = quote! {
                ::opentelemetry_instrument::__private::Settling::new(
                    __otel_invocation,
                    __otel_future,
                    |__otel_ret| #settle,
                )
            };
            let settling = if boxed {
                quote!(::std::boxed::Box::pin(#settling))
            } else {
                settling
            };
            quote! {
                let __otel_guard = __otel_invocation
                    .as_ref()
                    .map(::opentelemetry_instrument::__private::Invocation::attach);
                let __otel_future = ::opentelemetry_instrument::__private::call_once(move || {
                    #fake_return
                    #(#destructure)*
                    #(#stmts)*
                });
                ::std::mem::drop(__otel_guard);
                #fix_output
                #settling
            }
        }
        Output::Value(output) => {
            let fake_return = fake_return(output);
            let settle = settle(output);
            quote! {
                let __otel_guard = __otel_invocation
                    .as_ref()
                    .map(::opentelemetry_instrument::__private::Invocation::attach);
                let __otel_output = ::opentelemetry_instrument::__private::call_once(move || {
                    #fake_return
                    #(#destructure)*
                    #(#stmts)*
                });
                ::std::mem::drop(__otel_guard);
                if let ::std::option::Option::Some(__otel_invocation) = __otel_invocation {
                    let __otel_settlement = {
                        let __otel_ret = &__otel_output;
                        #settle
                    };
                    __otel_invocation.settle(__otel_settlement);
                }
                __otel_output
            }
        }
    };

    syn::parse2(quote!({
        #prologue
        #body
    }))
}

fn classify(sig: &Signature) -> Output<'_> {
    let ty = match &sig.output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) => Some(&**ty),
    };
    if sig.asyncness.is_some() {
        return Output::Async(ty);
    }
    match ty {
        Some(Type::ImplTrait(impl_trait)) => {
            let future_output = impl_trait.bounds.iter().find_map(|bound| match bound {
                TypeParamBound::Trait(bound) => future_output(&bound.path),
                _ => None,
            });
            match future_output {
                Some(output) => Output::ImplFuture(output),
                None => Output::Value(ty),
            }
        }
        Some(Type::Path(path)) => match boxed_future_output(&path.path) {
            Some(output) => Output::BoxedFuture(output),
            None => Output::Value(ty),
        },
        _ => Output::Value(ty),
    }
}

/// For a `Future<Output = T>` bound, `Some(Some(T))`.
fn future_output(path: &syn::Path) -> Option<Option<&Type>> {
    let segment = path.segments.last()?;
    if segment.ident != "Future" {
        return None;
    }
    let output = match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::AssocType(assoc) if assoc.ident == "Output" => Some(&assoc.ty),
            _ => None,
        }),
        _ => None,
    };
    Some(output)
}

/// For `Pin<Box<dyn Future<Output = T>>>`, `BoxFuture<'_, T>` and
/// `LocalBoxFuture<'_, T>`, `Some(Some(T))`.
fn boxed_future_output(path: &syn::Path) -> Option<Option<&Type>> {
    let segment = path.segments.last()?;
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    let mut types = args.args.iter().filter_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    });

    if segment.ident == "BoxFuture" || segment.ident == "LocalBoxFuture" {
        return Some(types.next());
    }
    if segment.ident != "Pin" {
        return None;
    }
    let Some(Type::Path(boxed)) = types.next() else {
        return None;
    };
    let boxed = boxed.path.segments.last()?;
    if boxed.ident != "Box" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &boxed.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(Type::TraitObject(object)) => {
            object.bounds.iter().find_map(|bound| match bound {
                TypeParamBound::Trait(bound) => future_output(&bound.path),
                _ => None,
            })
        }
        _ => None,
    })
}

/// Pins the return type of the block the body is moved into, so that `?`
/// and `return` inside it keep their meaning.
fn fake_return(output: Option<&Type>) -> TokenStream {
    match output {
        Some(ty) if !contains_impl_trait(ty) => quote! {
            #[allow(
                unknown_lints,
                unreachable_code,
                clippy::diverging_sub_expression,
                clippy::empty_loop,
                clippy::let_unit_value
            )]
            if false {
                let __otel_fake_return: #ty = loop {};
                return __otel_fake_return;
            }
        },
        _ => TokenStream::new(),
    }
}

fn contains_impl_trait(ty: &Type) -> bool {
    struct Finder(bool);

    impl<'ast> syn::visit::Visit<'ast> for Finder {
        fn visit_type_impl_trait(&mut self, _: &'ast syn::TypeImplTrait) {
            self.0 = true;
        }
    }

    let mut finder = Finder(false);
    syn::visit::visit_type(&mut finder, ty);
    finder.0
}

/// Expression turning `__otel_ret: &T` into a `Settlement`.
fn settle(output: Option<&Type>) -> TokenStream {
    let span = output.map_or_else(Span::call_site, Spanned::span);
    match output {
        None => quote!(::opentelemetry_instrument::Settlement::Unit),
        Some(Type::Tuple(tuple)) if tuple.elems.is_empty() => {
            quote!(::opentelemetry_instrument::Settlement::Unit)
        }
        Some(ty) if is_result(ty) => quote_spanned! {span=>
            match __otel_ret {
                ::std::result::Result::Ok(__otel_value) => {
                    (&&::opentelemetry_instrument::__private::Probe(__otel_value)).settle_value()
                }
                ::std::result::Result::Err(__otel_error) => {
                    (&&&::opentelemetry_instrument::__private::Probe(__otel_error)).settle_error()
                }
            }
        },
        Some(_) => quote_spanned! {span=>
            (&&::opentelemetry_instrument::__private::Probe(__otel_ret)).settle_value()
        },
    }
}

fn is_result(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Result"),
        Type::Paren(paren) => is_result(&paren.elem),
        Type::Group(group) => is_result(&group.elem),
        _ => false,
    }
}

/// Whether `attr` is a `#[with_span]` attribute, however it is imported.
pub(crate) fn is_with_span(attr: &syn::Attribute) -> bool {
    attr.path()
        .segments
        .last()
        .is_some_and(|segment| segment.ident == "with_span")
}
