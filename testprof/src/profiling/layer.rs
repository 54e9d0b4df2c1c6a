//! Tracing integration
//!
//! [`ProfilingLayer`] turns span enter/exit into recorder calls, so any code
//! instrumented with `#[tracing::instrument]` or manual spans shows up in the
//! per-test profile. Spans entered while no profiler is active on the thread
//! are not recorded.

use crate::profiling::recorder;
use testprof_common::FunctionKey;
use tracing::span::{Attributes, Id};
use tracing::{Metadata, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// Function identity stored in each span's extensions.
struct SpanKey(FunctionKey);

/// Layer feeding span activity into the thread's active recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfilingLayer;

impl ProfilingLayer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// `file:line(name)` of the span's callsite, or a builtin key when the
/// callsite has no source location.
#[must_use]
pub fn key_for(metadata: &Metadata<'_>) -> FunctionKey {
    match metadata.file() {
        Some(file) => FunctionKey::new(file, metadata.line().unwrap_or(0), metadata.name()),
        None => FunctionKey::builtin(format!("<{}>", metadata.name())),
    }
}

impl<S> tracing_subscriber::Layer<S> for ProfilingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, _attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let key = key_for(span.metadata());
            span.extensions_mut().insert(SpanKey(key));
        }
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if !recorder::is_recording() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            if let Some(SpanKey(key)) = span.extensions().get::<SpanKey>() {
                recorder::enter(key.clone());
            }
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if !recorder::is_recording() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            if let Some(SpanKey(key)) = span.extensions().get::<SpanKey>() {
                recorder::exit(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::Profiler;
    use tracing_subscriber::layer::SubscriberExt as _;

    #[tracing::instrument]
    fn leaf() -> u32 {
        7
    }

    #[tracing::instrument]
    fn branch() -> u32 {
        leaf() + leaf()
    }

    #[test]
    fn test_spans_become_call_records() {
        let subscriber = tracing_subscriber::registry().with(ProfilingLayer::new());
        let data = tracing::subscriber::with_default(subscriber, || {
            let profiler = Profiler::enable().unwrap();
            assert_eq!(branch(), 14);
            profiler.disable()
        });

        let (leaf_key, leaf_profile) = data.functions().iter().find(|(k, _)| k.name == "leaf").unwrap();
        assert_eq!(leaf_profile.stats.total_calls, 2);
        assert!(leaf_key.file.ends_with("layer.rs"));

        let branch_key = data.functions().keys().find(|k| k.name == "branch").unwrap();
        assert_eq!(leaf_profile.callers[branch_key].total_calls, 2);
    }

    #[test]
    fn test_spans_outside_profiler_are_ignored() {
        let subscriber = tracing_subscriber::registry().with(ProfilingLayer::new());
        tracing::subscriber::with_default(subscriber, || {
            branch();
            let profiler = Profiler::enable().unwrap();
            let data = profiler.disable();
            assert!(data.is_empty());
        });
    }
}
