/// A value that owns instrumented methods and can identify itself.
///
/// When an instrumented method runs and the current baggage carries no
/// component name yet, the receiver's identity is recorded on the span as
/// `componentName`/`runId` and propagated into the baggage seen by nested
/// instrumented calls.
///
/// Receivers that do not implement this trait simply contribute no
/// identity.
///
/// # Examples
///
/// ```
/// use opentelemetry_instrument::Component;
///
/// struct Workflow {
///     name: String,
///     run_id: String,
/// }
///
/// impl Component for Workflow {
///     fn component_name(&self) -> Option<&str> {
///         Some(&self.name)
///     }
///
///     fn run_id(&self) -> Option<&str> {
///         Some(&self.run_id)
///     }
/// }
/// ```
pub trait Component {
    /// The component name, e.g. the agent or workflow name.
    fn component_name(&self) -> Option<&str>;

    /// Identifier of the current run of this component, if any.
    fn run_id(&self) -> Option<&str> {
        None
    }

    /// Snapshot of this component's identity, if it has a non-empty name.
    fn identity(&self) -> Option<ComponentIdentity> {
        ComponentIdentity::new(self.component_name()?, self.run_id())
    }
}

impl Component for () {
    fn component_name(&self) -> Option<&str> {
        None
    }
}

impl<T: Component + ?Sized> Component for &T {
    fn component_name(&self) -> Option<&str> {
        (**self).component_name()
    }

    fn run_id(&self) -> Option<&str> {
        (**self).run_id()
    }
}

impl<T: Component + ?Sized> Component for std::sync::Arc<T> {
    fn component_name(&self) -> Option<&str> {
        (**self).component_name()
    }

    fn run_id(&self) -> Option<&str> {
        (**self).run_id()
    }
}

/// Owned identity of a [`Component`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentIdentity {
    pub(crate) name: String,
    pub(crate) run_id: Option<String>,
}

impl ComponentIdentity {
    /// Creates an identity. Returns `None` when `name` is empty; an empty
    /// `run_id` is dropped.
    pub fn new(name: &str, run_id: Option<&str>) -> Option<Self> {
        if name.is_empty() {
            return None;
        }
        Some(ComponentIdentity {
            name: name.to_owned(),
            run_id: run_id.filter(|id| !id.is_empty()).map(str::to_owned),
        })
    }

    /// The component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The run id, if any.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }
}
