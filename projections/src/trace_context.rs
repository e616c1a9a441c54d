//! Trace context propagation.
//!
//! The command side stores the W3C `traceparent`/`tracestate` of the request
//! that appended an event in the event's metadata. The subscriber continues
//! that trace: each handled event gets a span whose parent is the extracted
//! context. Outgoing HTTP calls carry the current span the same way.
//!
//! Parenting only takes effect under a subscriber that has the
//! [`otel_layer`] installed; without it spans carry no OpenTelemetry context.

use crm_projections_core::event::StoredEvent;
use crm_projections_core::event_kind::EventKind;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{
    Context as OtelContext, KeyValue, global, propagation::TextMapPropagator,
    trace::TraceContextExt,
};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use std::collections::HashMap;
use tracing::{Span, Subscriber};
use tracing_opentelemetry::{OpenTelemetryLayer, OpenTelemetrySpanExt};
use tracing_subscriber::registry::LookupSpan;

/// Instrumentation scope of every span this service creates.
const TRACER_NAME: &str = "crm-projections";

/// SDK tracer provider tagged with `service_name`.
#[must_use]
pub fn tracer_provider(service_name: &str) -> TracerProvider {
    let resource = Resource::new(vec![KeyValue::new("service.name", service_name.to_string())]);
    TracerProvider::builder()
        .with_config(opentelemetry_sdk::trace::config().with_resource(resource))
        .build()
}

/// `tracing` layer that turns spans into OpenTelemetry spans of `provider`.
///
/// The provider must outlive the layer; spans built after it is dropped
/// have no trace context.
pub fn otel_layer<S>(provider: &TracerProvider) -> OpenTelemetryLayer<S, Tracer>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME))
}

/// Make `provider` and the W3C propagator the process-wide defaults.
pub fn install_global(provider: TracerProvider) {
    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(provider);
}

/// Flush and drop the global tracer provider.
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}

/// Trace context stored with `event`, if it carries a valid one.
#[must_use]
pub fn extract_event_context(event: &StoredEvent) -> Option<OtelContext> {
    let carrier = event.metadata_carrier();
    if carrier.is_empty() {
        return None;
    }

    let context = TraceContextPropagator::new().extract(&carrier);
    if context.span().span_context().is_valid() {
        Some(context)
    } else {
        None
    }
}

/// Span for handling one event, parented on the event's trace context.
pub fn event_span(group: &str, event: &StoredEvent, kind: EventKind, object_id: &str) -> Span {
    let span = tracing::info_span!(
        "handle_event",
        subscription = group,
        tenant = %event.tenant(),
        aggregate_id = %event.aggregate_id,
        entity_id = object_id,
        event_type = kind.as_str(),
    );
    if let Some(context) = extract_event_context(event) {
        span.set_parent(context);
    }
    span
}

/// W3C headers for `span`, for outgoing HTTP requests.
#[must_use]
pub fn inject_trace_headers(span: &Span) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    TraceContextPropagator::new().inject_context(&span.context(), &mut headers);
    headers
}
