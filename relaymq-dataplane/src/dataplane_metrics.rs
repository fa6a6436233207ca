use metrics::{describe_counter, describe_gauge};

pub(crate) struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub(crate) const COUNTERS: [Metric; 4] = [
    MESSAGES_FORWARDED_TOTAL,
    MESSAGES_RECORDED_TOTAL,
    ACKS_PROCESSED_TOTAL,
    ACKS_REJECTED_TOTAL,
];
pub(crate) const GAUGES: [Metric; 1] = [INFLIGHT_MESSAGES];

// SUBSCRIBER Metrics --------------------------

pub(crate) const MESSAGES_FORWARDED_TOTAL: Metric = Metric {
    name: "relaymq_dataplane_messages_forwarded_total",
    description: "Total messages forwarded to the client sink (msg).",
};

// TRACKER Metrics --------------------------

pub(crate) const MESSAGES_RECORDED_TOTAL: Metric = Metric {
    name: "relaymq_dataplane_messages_recorded_total",
    description: "Total messages recorded as inflight (msg).",
};

pub(crate) const ACKS_PROCESSED_TOTAL: Metric = Metric {
    name: "relaymq_dataplane_acks_processed_total",
    description: "Total acknowledgements confirmed to the broker (msg).",
};

pub(crate) const ACKS_REJECTED_TOTAL: Metric = Metric {
    name: "relaymq_dataplane_acks_rejected_total",
    description: "Total acknowledgements that matched no inflight record (msg).",
};

pub(crate) const INFLIGHT_MESSAGES: Metric = Metric {
    name: "relaymq_dataplane_inflight_messages",
    description: "Messages delivered but not yet acked back to the broker",
};

/// Register metric descriptions with the installed recorder. The exporter
/// itself is installed by the process bootstrap, not here.
pub fn describe_dataplane_metrics() {
    for metric in COUNTERS {
        describe_counter!(metric.name, metric.description);
    }
    for metric in GAUGES {
        describe_gauge!(metric.name, metric.description);
    }
}
