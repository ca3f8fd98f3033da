//! Support for code generated by `#[with_span]` and `#[instrument_methods]`.
//!
//! The probes pick the most capable behavior a value's type supports at
//! compile time through autoref-based method resolution: a probe is called
//! on a stack of references, and the impl with the most references wins when
//! its bounds hold. All probe traits are imported anonymously by the
//! generated code.
#![allow(missing_docs, missing_debug_implementations, unreachable_pub)]
use crate::component::{Component, ComponentIdentity};
use crate::invocation::Settlement;
use crate::serialize::{to_attribute_value, NOT_SERIALIZABLE};
use serde::Serialize;
use std::fmt;

pub use crate::invocation::{Invocation, Settling};
pub use crate::options::SpanOptions;
pub use opentelemetry::trace::SpanKind;

/// Borrowed value under inspection.
pub struct Probe<'a, T: ?Sized>(pub &'a T);

// Attribute values, called as `(&&Probe(value)).attribute_value()`.

pub trait SerializeValue {
    fn attribute_value(&self) -> String;
    fn settle_value(&self) -> Settlement;
}

impl<T: Serialize + ?Sized> SerializeValue for &Probe<'_, T> {
    fn attribute_value(&self) -> String {
        to_attribute_value(self.0)
    }

    fn settle_value(&self) -> Settlement {
        Settlement::value(self.0)
    }
}

pub trait OpaqueValue {
    fn attribute_value(&self) -> String;
    fn settle_value(&self) -> Settlement;
}

impl<T: ?Sized> OpaqueValue for Probe<'_, T> {
    fn attribute_value(&self) -> String {
        NOT_SERIALIZABLE.to_owned()
    }

    fn settle_value(&self) -> Settlement {
        Settlement::Value(NOT_SERIALIZABLE.to_owned())
    }
}

// Errors, called as `(&&&Probe(err)).settle_error()`.

pub trait DisplayError {
    fn settle_error(&self) -> Settlement;
}

impl<E: fmt::Display + ?Sized> DisplayError for &&Probe<'_, E> {
    fn settle_error(&self) -> Settlement {
        Settlement::error(self.0)
    }
}

pub trait DebugError {
    fn settle_error(&self) -> Settlement;
}

impl<E: fmt::Debug + ?Sized> DebugError for &Probe<'_, E> {
    fn settle_error(&self) -> Settlement {
        Settlement::failed(format!("{:?}", self.0))
    }
}

pub trait OpaqueError {
    fn settle_error(&self) -> Settlement;
}

impl<E: ?Sized> OpaqueError for Probe<'_, E> {
    fn settle_error(&self) -> Settlement {
        Settlement::failed("Unknown error")
    }
}

// Receivers, called as `(&&Probe(receiver)).component_identity()`.

pub trait ComponentReceiver {
    fn component_identity(&self) -> Option<ComponentIdentity>;
}

impl<T: Component + ?Sized> ComponentReceiver for &Probe<'_, T> {
    fn component_identity(&self) -> Option<ComponentIdentity> {
        self.0.identity()
    }
}

pub trait PlainReceiver {
    fn component_identity(&self) -> Option<ComponentIdentity>;
}

impl<T: ?Sized> PlainReceiver for Probe<'_, T> {
    fn component_identity(&self) -> Option<ComponentIdentity> {
        None
    }
}

/// Fixes the output type of a future returned as `impl Future`, so the
/// settlement of its output can be resolved.
pub fn with_output<T, F>(future: F) -> F
where
    F: std::future::Future<Output = T>,
{
    future
}

/// Runs the moved body of an instrumented function.
///
/// Taking the closure as `FnOnce` keeps its inferred kind `FnOnce`, so bodies
/// may hand out borrows of captured `&mut` receivers.
pub fn call_once<R, F>(body: F) -> R
where
    F: FnOnce() -> R,
{
    body()
}

/// Whether a call passes the optional method filter of its options.
pub fn admits<F>(filter: F, method_name: &str) -> bool
where
    F: Fn(&str) -> bool,
{
    filter(method_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Opaque;

    #[derive(Debug)]
    struct DebugOnly;

    struct Named;

    impl Component for Named {
        fn component_name(&self) -> Option<&str> {
            Some("named")
        }
    }

    #[test]
    fn values_fall_back_to_sentinel() {
        assert_eq!((&&Probe(&5)).attribute_value(), "5");
        assert_eq!((&&Probe(&Opaque)).attribute_value(), NOT_SERIALIZABLE);
        assert_eq!((&&Probe(&())).settle_value(), Settlement::Unit);
        assert_eq!(
            (&&Probe(&Opaque)).settle_value(),
            Settlement::Value(NOT_SERIALIZABLE.into())
        );
    }

    #[test]
    fn errors_use_their_richest_description() {
        assert_eq!(
            (&&&Probe(&std::fmt::Error)).settle_error(),
            Settlement::error(&std::fmt::Error)
        );
        assert_eq!(
            (&&&Probe(&DebugOnly)).settle_error(),
            Settlement::failed("DebugOnly")
        );
        assert_eq!(
            (&&&Probe(&Opaque)).settle_error(),
            Settlement::failed("Unknown error")
        );
    }

    #[test]
    fn receivers_without_component_have_no_identity() {
        assert_eq!(
            (&&Probe(&Named)).component_identity(),
            ComponentIdentity::new("named", None)
        );
        assert_eq!((&&Probe(&Opaque)).component_identity(), None);
    }
}
