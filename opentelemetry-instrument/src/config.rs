//! Configuration for [`Telemetry`](crate::Telemetry) handles.
//!
//! Defaults are read from the environment and can be overridden with the
//! builder methods.
//!
//! The supported environment variables are:
//! * `OTEL_SDK_DISABLED`
//! * `OTEL_INSTRUMENT_TRACER_NAME`
use std::borrow::Cow;
use std::env;

/// Disables instrumentation when set to `true` (case-insensitive).
pub const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
/// Name of the tracer used when an instrumented call does not name one.
pub const OTEL_INSTRUMENT_TRACER_NAME: &str = "OTEL_INSTRUMENT_TRACER_NAME";
/// Default value for [`OTEL_INSTRUMENT_TRACER_NAME`].
pub const OTEL_INSTRUMENT_TRACER_NAME_DEFAULT: &str = "default-tracer";

/// Settings shared by every call instrumented through one
/// [`Telemetry`](crate::Telemetry) handle.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub(crate) default_tracer_name: Cow<'static, str>,
    pub(crate) disabled: bool,
}

impl Default for TelemetryConfig {
    /// Create default telemetry config, with values taken from the environment
    /// where set.
    fn default() -> Self {
        TelemetryConfigBuilder::default().build()
    }
}

impl TelemetryConfig {
    /// The tracer name used when a call does not specify one.
    pub fn default_tracer_name(&self) -> &str {
        &self.default_tracer_name
    }

    /// Whether instrumentation through this handle is switched off.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

/// A builder for creating [`TelemetryConfig`] instances.
#[derive(Debug)]
pub struct TelemetryConfigBuilder {
    default_tracer_name: Cow<'static, str>,
    disabled: bool,
}

impl Default for TelemetryConfigBuilder {
    /// Create a new [`TelemetryConfigBuilder`] initialized with the default
    /// values, overridden by environment variables if set.
    fn default() -> Self {
        TelemetryConfigBuilder {
            default_tracer_name: Cow::Borrowed(OTEL_INSTRUMENT_TRACER_NAME_DEFAULT),
            disabled: false,
        }
        .init_from_env_vars()
    }
}

impl TelemetryConfigBuilder {
    /// Set the tracer name used when an instrumented call does not name one.
    /// The default value is `default-tracer`.
    pub fn with_default_tracer_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.default_tracer_name = name.into();
        self
    }

    /// Switch instrumentation off. A disabled handle is treated as if no
    /// telemetry were active.
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Builds a [`TelemetryConfig`].
    pub fn build(self) -> TelemetryConfig {
        TelemetryConfig {
            default_tracer_name: self.default_tracer_name,
            disabled: self.disabled,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(disabled) = env::var(OTEL_SDK_DISABLED)
            .ok()
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
        {
            self.disabled = disabled;
        }

        if let Some(name) = env::var(OTEL_INSTRUMENT_TRACER_NAME)
            .ok()
            .filter(|name| !name.trim().is_empty())
        {
            self.default_tracer_name = Cow::Owned(name);
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let env_vars = vec![OTEL_SDK_DISABLED, OTEL_INSTRUMENT_TRACER_NAME];
        let config = temp_env::with_vars_unset(env_vars, TelemetryConfig::default);

        assert_eq!(
            config.default_tracer_name(),
            OTEL_INSTRUMENT_TRACER_NAME_DEFAULT
        );
        assert!(!config.is_disabled());
    }

    #[test]
    fn test_config_from_env() {
        let env_vars = vec![
            (OTEL_SDK_DISABLED, Some("TRUE")),
            (OTEL_INSTRUMENT_TRACER_NAME, Some("agents")),
        ];
        let config = temp_env::with_vars(env_vars, TelemetryConfig::default);

        assert_eq!(config.default_tracer_name(), "agents");
        assert!(config.is_disabled());
    }

    #[test]
    fn test_invalid_env_values_keep_defaults() {
        let env_vars = vec![
            (OTEL_SDK_DISABLED, Some("yes")),
            (OTEL_INSTRUMENT_TRACER_NAME, Some("  ")),
        ];
        let config = temp_env::with_vars(env_vars, TelemetryConfig::default);

        assert_eq!(
            config.default_tracer_name(),
            OTEL_INSTRUMENT_TRACER_NAME_DEFAULT
        );
        assert!(!config.is_disabled());
    }

    #[test]
    fn test_builder_overrides_env() {
        let env_vars = vec![(OTEL_INSTRUMENT_TRACER_NAME, Some("from-env"))];
        let config = temp_env::with_vars(env_vars, || {
            TelemetryConfigBuilder::default()
                .with_default_tracer_name("from-builder")
                .with_disabled(true)
                .build()
        });

        assert_eq!(config.default_tracer_name(), "from-builder");
        assert!(config.is_disabled());
    }
}
