//! Observability interfaces: callback logger, metrics registry and trace
//! spans.
//!
//! These are deliberately thin: the runtime defines the shapes and invokes
//! the callbacks; what happens with a log line, metric sample or finished
//! span belongs to the embedding application.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use rand::Rng;

use crate::status::Timespec;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Callback receiving one log line.
pub type LogSink = dyn Fn(LogLevel, &str) + Send + Sync;

/// Minimum-level-gated callback logger. Messages below the configured level
/// are dropped before formatting reaches the sink.
pub struct Logger {
    min_level: LogLevel,
    sink: Box<LogSink>,
}

impl Logger {
    pub fn new(min_level: LogLevel, sink: impl Fn(LogLevel, &str) + Send + Sync + 'static) -> Logger {
        Logger {
            min_level,
            sink: Box::new(sink),
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if level >= self.min_level {
            (self.sink)(level, message);
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Clone, Debug)]
pub struct MetricSnapshot {
    pub name: String,
    pub description: String,
    pub kind: MetricKind,
    pub value: f64,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug)]
struct Metric {
    description: String,
    kind: MetricKind,
    value: f64,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

/// Registry of named counters, gauges and histograms.
#[derive(Default)]
pub struct MetricsRegistry {
    metrics: Mutex<HashMap<String, Metric>>,
}

impl MetricsRegistry {
    pub fn new() -> MetricsRegistry {
        MetricsRegistry::default()
    }

    pub fn register(&self, name: &str, description: &str, kind: MetricKind) {
        let mut metrics = self.metrics.lock().unwrap();
        metrics.entry(name.to_string()).or_insert(Metric {
            description: description.to_string(),
            kind,
            value: 0.0,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        });
    }

    /// Add `delta` to a counter, or record a histogram observation.
    pub fn increment(&self, name: &str, delta: f64) {
        let mut metrics = self.metrics.lock().unwrap();
        if let Some(metric) = metrics.get_mut(name) {
            match metric.kind {
                MetricKind::Counter => metric.value += delta,
                MetricKind::Histogram => {
                    metric.value = delta;
                    metric.count += 1;
                    metric.sum += delta;
                    metric.min = metric.min.min(delta);
                    metric.max = metric.max.max(delta);
                }
                MetricKind::Gauge => {}
            }
        }
    }

    /// Set a gauge.
    pub fn set(&self, name: &str, value: f64) {
        let mut metrics = self.metrics.lock().unwrap();
        if let Some(metric) = metrics.get_mut(name) {
            if metric.kind == MetricKind::Gauge {
                metric.value = value;
            }
        }
    }

    pub fn snapshot(&self, name: &str) -> Option<MetricSnapshot> {
        let metrics = self.metrics.lock().unwrap();
        metrics.get(name).map(|m| MetricSnapshot {
            name: name.to_string(),
            description: m.description.clone(),
            kind: m.kind,
            value: m.value,
            count: m.count,
            sum: m.sum,
            min: m.min,
            max: m.max,
        })
    }
}

/// One tracing span. Ids are 16 lowercase hex characters.
#[derive(Clone, Debug)]
pub struct TraceSpan {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub operation: String,
    pub started_at: Timespec,
    pub finished_at: Option<Timespec>,
    pub tags: Vec<(String, String)>,
    pub logs: Vec<(Timespec, String)>,
    start: Instant,
    pub elapsed: Option<std::time::Duration>,
}

impl TraceSpan {
    pub fn add_tag(&mut self, key: &str, value: &str) {
        self.tags.push((key.to_string(), value.to_string()));
    }

    pub fn add_log(&mut self, message: &str) {
        self.logs.push((Timespec::now(), message.to_string()));
    }
}

/// Callback invoked exactly once per finished span.
pub type SpanExporter = dyn Fn(&TraceSpan) + Send + Sync;

pub struct Tracer {
    exporter: Box<SpanExporter>,
}

impl Tracer {
    pub fn new(exporter: impl Fn(&TraceSpan) + Send + Sync + 'static) -> Tracer {
        Tracer {
            exporter: Box::new(exporter),
        }
    }

    /// Start a span. A child span inherits its parent's trace id.
    pub fn start_span(&self, operation: &str, parent: Option<&TraceSpan>) -> TraceSpan {
        TraceSpan {
            trace_id: parent
                .map(|p| p.trace_id.clone())
                .unwrap_or_else(hex_id),
            span_id: hex_id(),
            parent_span_id: parent.map(|p| p.span_id.clone()),
            operation: operation.to_string(),
            started_at: Timespec::now(),
            finished_at: None,
            tags: Vec::new(),
            logs: Vec::new(),
            start: Instant::now(),
            elapsed: None,
        }
    }

    /// Finish a span and export it.
    pub fn finish_span(&self, mut span: TraceSpan) {
        span.finished_at = Some(Timespec::now());
        span.elapsed = Some(span.start.elapsed());
        (self.exporter)(&span);
    }
}

fn hex_id() -> String {
    const CHARSET: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
