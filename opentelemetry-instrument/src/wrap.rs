use crate::component::Component;
use crate::invocation::{Invocation, Settlement, Settling};
use crate::options::SpanOptions;
use crate::serialize::positional_arguments;
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt::Display;

/// Values that describe how a call ended.
pub trait Settle {
    /// The settlement recorded on the call's span.
    fn settlement(&self) -> Settlement;
}

impl<T, E> Settle for Result<T, E>
where
    T: Serialize,
    E: Display,
{
    fn settlement(&self) -> Settlement {
        match self {
            Ok(value) => Settlement::value(value),
            Err(err) => Settlement::error(err),
        }
    }
}

impl Settle for () {
    fn settlement(&self) -> Settlement {
        Settlement::Unit
    }
}

/// Return types of callables accepted by [`wrap_fn`] and [`wrap_method`].
///
/// Immediate results settle the invocation right away; futures settle it when
/// they complete. Immediate values of other types can be returned as
/// [`Returned`], and values that cannot be serialized as
/// [`Opaque`](crate::Opaque).
pub trait Outcome: Sized {
    /// Settles `invocation` with this outcome, or arranges for it to be
    /// settled later, and hands the outcome back to the caller.
    fn observe(self, invocation: Invocation) -> Self;
}

/// An immediate return value of any serializable type.
///
/// ```
/// use opentelemetry_instrument::{wrap_fn, Opaque, Returned, SpanOptions};
///
/// let open = wrap_fn("open", SpanOptions::new(), |(path,): (String,)| {
///     Returned(Opaque(std::path::PathBuf::from(path)))
/// });
/// let Returned(Opaque(path)) = open(("/tmp".to_string(),));
/// assert!(path.is_absolute());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Returned<T>(pub T);

impl<T> Returned<T> {
    /// Returns the wrapped value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize> Settle for Returned<T> {
    fn settlement(&self) -> Settlement {
        Settlement::value(&self.0)
    }
}

impl<T: Serialize> Settle for Option<T> {
    fn settlement(&self) -> Settlement {
        Settlement::value(self)
    }
}

impl<T: Serialize> Settle for Vec<T> {
    fn settlement(&self) -> Settlement {
        Settlement::value(self)
    }
}

macro_rules! settle_values {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Settle for $ty {
                fn settlement(&self) -> Settlement {
                    Settlement::value(self)
                }
            }
        )*
    };
}

settle_values!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, &'static str,
);

macro_rules! immediate_outcomes {
    ($([$($generics:tt)*] $ty:ty),* $(,)?) => {
        $(
            impl<$($generics)*> Outcome for $ty {
                fn observe(self, invocation: Invocation) -> Self {
                    invocation.settle(self.settlement());
                    self
                }
            }
        )*
    };
}

immediate_outcomes!(
    [] (),
    [T: Serialize] Returned<T>,
    [T: Serialize] Option<T>,
    [T: Serialize] Vec<T>,
    [] bool, [] char,
    [] i8, [] i16, [] i32, [] i64, [] i128, [] isize,
    [] u8, [] u16, [] u32, [] u64, [] u128, [] usize,
    [] f32, [] f64,
    [] String, [] &'static str,
);

immediate_outcomes!([T: Serialize, E: Display] Result<T, E>);

impl<'a, O> Outcome for BoxFuture<'a, O>
where
    O: Settle + Send + 'a,
{
    fn observe(self, invocation: Invocation) -> Self {
        Box::pin(Settling::new(Some(invocation), self, O::settlement))
    }
}

/// Wraps `f` so that every call runs inside a span.
///
/// Arguments are passed as one serializable value, usually a tuple; each
/// tuple element is recorded as a positional argument attribute.
///
/// ```
/// use opentelemetry_instrument::{wrap_fn, SpanOptions};
///
/// let divide = wrap_fn("divide", SpanOptions::new(), |(a, b): (i32, i32)| {
///     a.checked_div(b).ok_or("division by zero")
/// });
/// assert_eq!(divide((6, 3)), Ok(2));
/// assert_eq!(divide((1, 0)), Err("division by zero"));
/// ```
pub fn wrap_fn<A, R, F>(
    method_name: impl Into<Cow<'static, str>>,
    options: SpanOptions,
    f: F,
) -> impl Fn(A) -> R
where
    A: Serialize,
    R: Outcome,
    F: Fn(A) -> R,
{
    let method_name = method_name.into();
    move |args: A| {
        let Some(invocation) = Invocation::begin(&options, &method_name) else {
            return f(args);
        };
        let invocation = invocation
            .with_arguments(positional_arguments(&args))
            .with_component(None);

        let output = {
            let _guard = invocation.attach();
            f(args)
        };
        output.observe(invocation)
    }
}

/// Wraps the method `f` of `S` so that every call runs inside a span.
///
/// Like [`wrap_fn`], additionally taking the receiver's [`Component`]
/// identity into account. The receiver is not recorded as an argument.
pub fn wrap_method<S, A, R, F>(
    method_name: impl Into<Cow<'static, str>>,
    options: SpanOptions,
    f: F,
) -> impl Fn(&S, A) -> R
where
    S: Component + ?Sized,
    A: Serialize,
    R: Outcome,
    F: Fn(&S, A) -> R,
{
    let method_name = method_name.into();
    move |receiver: &S, args: A| {
        let Some(invocation) = Invocation::begin(&options, &method_name) else {
            return f(receiver, args);
        };
        let invocation = invocation
            .with_arguments(positional_arguments(&args))
            .with_component(receiver.identity());

        let output = {
            let _guard = invocation.attach();
            f(receiver, args)
        };
        output.observe(invocation)
    }
}
