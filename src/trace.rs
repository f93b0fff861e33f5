//! Tracing hooks that vanish when the `tracing` feature is off.
//!
//! Stage loops open spans with `trace_span!`, report hypothesis counts with
//! `trace_event!`, and checkpoint loading reports missing parameters with
//! `trace_warn!`. Without the feature every macro expands to a no-op that
//! still evaluates its field expressions.

/// Opens an info-level span around a stage or network pass.
///
/// With `tracing` enabled this is `tracing::info_span!`. Without it the
/// macro yields a `NoopSpan` so `let _guard = trace_span!(..).entered();`
/// compiles unchanged at every call site.
#[cfg(feature = "tracing")]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($name $(, $($field)*)?)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        $crate::trace::NoopSpan
    };
}

/// Emits a debug-level event with `key = value` fields, such as hypothesis
/// counts per iteration or the depth extent of a finished stage.
///
/// Without `tracing` the values are still evaluated and then dropped, so
/// variables computed only for logging do not trigger unused warnings.
#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::debug!(name: $name, $($key = $value),+)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        let _ = ($($value,)+);
    };
}

/// Emits a warning with a formatted message, used for checkpoint entries
/// that could not be found.
///
/// Without `tracing` the format arguments are type-checked and discarded.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)+) => {
        tracing::warn!($($arg)+)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)+) => {
        let _ = format_args!($($arg)+);
    };
}

pub(crate) use trace_event;
pub(crate) use trace_span;
pub(crate) use trace_warn;

/// Stand-in for `tracing::Span` so `trace_span!(..).entered()` compiles
/// without the feature.
#[cfg(not(feature = "tracing"))]
pub struct NoopSpan;

#[cfg(not(feature = "tracing"))]
impl NoopSpan {
    /// Mirrors `tracing::Span::entered`.
    #[inline]
    pub fn entered(self) -> Self {
        self
    }
}
