use relaymq_common::RequestParam;
use tracing::{field, info_span, Span};

/// Worker span carrying the subscription coordinates plus, when the
/// pipeline serves a live client request, its request parameters.
pub(crate) fn component_span(
    component: &'static str,
    stream: &str,
    subject: &str,
    consumer: &str,
    request: Option<&RequestParam>,
) -> Span {
    let span = info_span!(
        "dataplane",
        component,
        stream = %stream,
        subject = %subject,
        consumer = %consumer,
        request_id = field::Empty,
        request_method = field::Empty,
        request_uri = field::Empty,
    );
    if let Some(request) = request {
        request.record(&span);
    }
    span
}
