//! Distributed-trace header interop
//!
//! A single custom header carries trace continuation:
//! `observa-trace: {trace_id}-{span_id}-{0|1}`. For interoperability with
//! the widely deployed convention the same value is also accepted under
//! `sentry-trace`.

use std::collections::HashMap;

use crate::scope::{set_propagation_context, PropagationContext};

/// Primary trace header name.
pub const TRACE_HEADER: &str = "observa-trace";

/// Alternate header name accepted for interoperability.
pub const ALT_TRACE_HEADER: &str = "sentry-trace";

/// Parses a trace header value into a propagation context.
///
/// Returns `None` when the value has no trace id.
pub fn parse_trace_header(value: &str) -> Option<PropagationContext> {
    let mut parts = value.splitn(3, '-');
    let trace_id = parts.next().filter(|t| !t.is_empty())?;
    let span_id = parts.next().filter(|s| !s.is_empty());
    let sampled = parts.next().map(|f| f == "1" || f == "true");
    Some(PropagationContext {
        trace_id: Some(trace_id.to_string()),
        span_id: span_id.map(str::to_string),
        sampled,
    })
}

/// Continues a trace from inbound request headers, if either the primary or
/// the alternate header is present. Header names match case-insensitively.
pub fn continue_trace_from_headers(headers: &HashMap<String, String>) {
    let value = lookup(headers, TRACE_HEADER).or_else(|| lookup(headers, ALT_TRACE_HEADER));
    if let Some(context) = value.and_then(|v| parse_trace_header(v)) {
        set_propagation_context(context);
    }
}

fn lookup<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Formats the outbound trace header for the given propagation context.
pub fn trace_header(context: &PropagationContext) -> (String, String) {
    let trace_id = context.trace_id.as_deref().unwrap_or("");
    let span_id = context.span_id.as_deref().unwrap_or("");
    let flag = if context.sampled == Some(true) { "1" } else { "0" };
    (
        TRACE_HEADER.to_string(),
        format!("{}-{}-{}", trace_id, span_id, flag),
    )
}
