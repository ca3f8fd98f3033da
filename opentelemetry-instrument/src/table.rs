use crate::component::Component;
use crate::error::{InstrumentError, Result};
use crate::options::{InstrumentOptions, SpanOptions};
use crate::wrap::{wrap_method, Outcome};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A method of `S` taking arguments `A` and returning `R`.
pub type Method<S, A, R> = Arc<dyn Fn(&S, A) -> R + Send + Sync>;

struct Entry<S: ?Sized, A, R> {
    name: Cow<'static, str>,
    method: Method<S, A, R>,
    explicit: bool,
}

impl<S: ?Sized, A, R> Clone for Entry<S, A, R> {
    fn clone(&self) -> Self {
        Entry {
            name: self.name.clone(),
            method: Arc::clone(&self.method),
            explicit: self.explicit,
        }
    }
}

/// Named methods of one type sharing a signature, in insertion order.
///
/// A table is the runtime counterpart of an `impl` block: an
/// [`Instrumentor`] turns it into a table whose eligible methods run inside
/// spans.
///
/// ```
/// use opentelemetry_instrument::{Component, InstrumentOptions, Instrumentor, MethodTable};
///
/// struct Counter;
///
/// impl Component for Counter {
///     fn component_name(&self) -> Option<&str> {
///         Some("counter")
///     }
/// }
///
/// let table = MethodTable::<Counter, (i64,), Result<i64, String>>::new()
///     .with_method("double", |_, (n,)| Ok(n * 2))
///     .with_method("negate", |_, (n,)| Ok(-n));
/// let table = Instrumentor::new(InstrumentOptions::new().with_prefix("counter"))
///     .instrument(table);
///
/// assert_eq!(table.call("double", &Counter, (21,)), Ok(Ok(42)));
/// assert!(table.call("triple", &Counter, (1,)).is_err());
/// ```
pub struct MethodTable<S: ?Sized, A, R> {
    entries: Vec<Entry<S, A, R>>,
}

impl<S: ?Sized, A, R> Default for MethodTable<S, A, R> {
    fn default() -> Self {
        MethodTable {
            entries: Vec::new(),
        }
    }
}

impl<S: ?Sized, A, R> Clone for MethodTable<S, A, R> {
    fn clone(&self) -> Self {
        MethodTable {
            entries: self.entries.clone(),
        }
    }
}

impl<S: ?Sized, A, R> fmt::Debug for MethodTable<S, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| &entry.name))
            .finish()
    }
}

impl<S: ?Sized, A, R> MethodTable<S, A, R> {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `method` under `name`, replacing any method of the same name.
    pub fn with_method<F>(mut self, name: impl Into<Cow<'static, str>>, method: F) -> Self
    where
        F: Fn(&S, A) -> R + Send + Sync + 'static,
    {
        let entry = Entry {
            name: name.into(),
            method: Arc::new(method),
            explicit: false,
        };
        match self.position(&entry.name) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// Adds `method` under `name`.
    ///
    /// Fails with [`InstrumentError::DuplicateMethod`] if the name is taken.
    pub fn insert<F>(&mut self, name: impl Into<Cow<'static, str>>, method: F) -> Result<()>
    where
        F: Fn(&S, A) -> R + Send + Sync + 'static,
    {
        let name = name.into();
        if self.position(&name).is_some() {
            return Err(InstrumentError::DuplicateMethod(name));
        }
        self.entries.push(Entry {
            name,
            method: Arc::new(method),
            explicit: false,
        });
        Ok(())
    }

    /// The method registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Method<S, A, R>> {
        self.position(name).map(|index| &self.entries[index].method)
    }

    /// Calls the method `name` on `receiver`.
    ///
    /// Fails with [`InstrumentError::UnknownMethod`] if no such method exists.
    pub fn call(&self, name: &str, receiver: &S, args: A) -> Result<R> {
        let method = self
            .get(name)
            .ok_or_else(|| InstrumentError::UnknownMethod(Cow::Owned(name.to_owned())))?;
        Ok(method(receiver, args))
    }

    /// Method names, in insertion order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_ref())
    }

    /// Number of methods.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no methods.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }
}

impl<S, A, R> MethodTable<S, A, R>
where
    S: Component + ?Sized + 'static,
    A: Serialize + 'static,
    R: Outcome + 'static,
{
    /// Adds `method` under `name`, instrumented with its own `options`.
    ///
    /// An [`Instrumentor`] leaves such methods as they are.
    pub fn with_instrumented_method<F>(
        mut self,
        name: impl Into<Cow<'static, str>>,
        options: SpanOptions,
        method: F,
    ) -> Self
    where
        F: Fn(&S, A) -> R + Send + Sync + 'static,
    {
        let name = name.into();
        let entry = Entry {
            name: name.clone(),
            method: Arc::new(wrap_method(name, options, method)),
            explicit: true,
        };
        match self.position(&entry.name) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
        self
    }
}

/// Instruments every eligible method of a [`MethodTable`].
#[derive(Clone, Debug, Default)]
pub struct Instrumentor {
    options: InstrumentOptions,
}

impl Instrumentor {
    /// Creates an instrumentor applying `options`.
    pub fn new(options: InstrumentOptions) -> Self {
        Instrumentor { options }
    }

    /// The options applied to each method.
    pub fn options(&self) -> &InstrumentOptions {
        &self.options
    }

    /// Returns `table` with every method wrapped in a span, except methods
    /// the options exclude or filter out and methods that already carry
    /// their own instrumentation.
    pub fn instrument<S, A, R>(&self, table: MethodTable<S, A, R>) -> MethodTable<S, A, R>
    where
        S: Component + ?Sized + 'static,
        A: Serialize + 'static,
        R: Outcome + 'static,
    {
        let entries = table
            .entries
            .into_iter()
            .map(|entry| {
                if entry.explicit || !self.options.includes(&entry.name) {
                    return entry;
                }
                let options = self.options.span_options(&entry.name);
                let inner = entry.method;
                let method: Method<S, A, R> = Arc::new(wrap_method(
                    entry.name.clone(),
                    options,
                    move |receiver: &S, args: A| inner(receiver, args),
                ));
                Entry {
                    name: entry.name,
                    method,
                    explicit: false,
                }
            })
            .collect();

        MethodTable { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Calculator;

    type Table = MethodTable<Calculator, (i32, i32), std::result::Result<i32, String>>;

    fn table() -> Table {
        MethodTable::new()
            .with_method("add", |_, (a, b)| Ok(a + b))
            .with_method("sub", |_, (a, b)| Ok(a - b))
    }

    #[test]
    fn keeps_insertion_order() {
        let table = table().with_method("mul", |_, (a, b)| Ok(a * b));
        assert_eq!(table.method_names().collect::<Vec<_>>(), ["add", "sub", "mul"]);
        assert_eq!(table.len(), 3);
        assert!(!table.is_empty());
        assert!(Table::new().is_empty());
    }

    #[test]
    fn with_method_replaces_same_name() {
        let table = table().with_method("add", |_, (a, b)| Ok(a + b + 1));
        assert_eq!(table.len(), 2);
        assert_eq!(table.call("add", &Calculator, (1, 1)), Ok(Ok(3)));
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut table = table();
        assert_eq!(
            table.insert("add", |_, _| Ok(0)),
            Err(InstrumentError::DuplicateMethod("add".into()))
        );
        assert_eq!(table.insert("mul", |_, (a, b)| Ok(a * b)), Ok(()));
        assert_eq!(table.call("mul", &Calculator, (2, 4)), Ok(Ok(8)));
    }

    #[test]
    fn call_reports_unknown_method() {
        assert_eq!(
            table().call("div", &Calculator, (1, 1)),
            Err(InstrumentError::UnknownMethod("div".into()))
        );
        assert!(table().get("sub").is_some());
        assert!(table().get("div").is_none());
    }
}
