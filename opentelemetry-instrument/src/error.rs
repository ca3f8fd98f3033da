use std::borrow::Cow;
use thiserror::Error;

/// A specialized `Result` type for instrumentation operations.
pub type Result<T> = std::result::Result<T, InstrumentError>;

/// Errors returned by the method table API.
///
/// Wrapped calls never produce these: instrumentation failures (for example
/// a value that cannot be serialized) are recovered locally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InstrumentError {
    /// No method with the given name is registered in the table.
    #[error("no method named `{0}` in the method table")]
    UnknownMethod(Cow<'static, str>),

    /// A method with the given name is already registered in the table.
    #[error("method `{0}` is already registered in the method table")]
    DuplicateMethod(Cow<'static, str>),
}
