use super::{Log, LogLevel};
use serde_json::json;

// Credit to this blog for a high-level overview of implementing a custom
// tracing layer: https://burgers.io/custom-logging-in-rust-using-tracing
//
// Example usage:
//
//   use tracing_subscriber::prelude::*;
//   let env_filter = tracing_subscriber::EnvFilter::from_default_env();
//   tracing_subscriber::registry()
//     .with(gpbackup_ops::tracing_layer::Layer::new(gpbackup_ops::stderr_log_handler, std::time::SystemTime::now).with_filter(env_filter))
//     .init();

pub struct Layer<H, T>(H, T)
where
    H: Fn(Log),
    T: Fn() -> std::time::SystemTime;

impl<H, T> Layer<H, T>
where
    H: Fn(Log),
    T: Fn() -> std::time::SystemTime,
{
    pub fn new(handler: H, timesource: T) -> Self {
        Self(handler, timesource)
    }

    fn log_from_metadata(&self, metadata: &tracing::Metadata) -> Log {
        let mut log = Log {
            timestamp: self.1().into(),
            level: level_from_tracing(metadata.level()),
            message: String::new(),
            fields: Default::default(),
            spans: Default::default(),
        };
        log.fields
            .insert("module".to_string(), serde_json::value::to_raw_value(metadata.target()).unwrap());
        log
    }
}

impl<S, H, T> tracing_subscriber::Layer<S> for Layer<H, T>
where
    S: tracing::Subscriber,
    S: for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
    H: Fn(Log) + 'static,
    T: Fn() -> std::time::SystemTime + 'static,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut log = self.log_from_metadata(attrs.metadata());
        log.message = attrs.metadata().name().to_string();
        attrs.record(&mut FieldVisitor(&mut log));

        let span = ctx.span(id).unwrap();
        let mut extensions = span.extensions_mut();
        extensions.insert(log);
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let span = ctx.span(id).unwrap();
        let mut extensions = span.extensions_mut();
        let log: &mut Log = extensions.get_mut::<Log>().unwrap();
        values.record(&mut FieldVisitor(log));
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut log = self.log_from_metadata(event.metadata());
        event.record(&mut FieldVisitor(&mut log));

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                let extensions = span.extensions();
                let span = extensions.get::<Log>().unwrap();
                log.spans.push(span.clone());
            }
        }

        self.0(log)
    }
}

struct FieldVisitor<'a>(&'a mut Log);

impl<'a> FieldVisitor<'a> {
    fn record_raw<S>(&mut self, field: &tracing::field::Field, value: S)
    where
        S: serde::Serialize + ToString,
    {
        if field.name() == "message" && self.0.message.is_empty() {
            self.0.message = value.to_string();
        } else if let Ok(value) = serde_json::value::to_raw_value(&value) {
            self.0.fields.insert(field.name().to_string(), value);
        } else {
            self.0.fields.insert(
                field.name().to_string(),
                serde_json::value::to_raw_value(&json!(value.to_string())).unwrap(),
            );
        }
    }
}

impl<'a> tracing::field::Visit for FieldVisitor<'a> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.record_raw(field, value)
    }
    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.record_raw(field, value)
    }
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.record_raw(field, value)
    }
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.record_raw(field, value)
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record_raw(field, value)
    }
    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        let parsed = |value: &dyn std::error::Error| {
            let value = format!("{value}");
            match serde_json::from_str::<serde_json::Value>(&value) {
                Ok(v) => v,
                Err(_) => serde_json::Value::String(value),
            }
        };

        if value.source().is_none() {
            self.record_raw(field, parsed(value));
            return;
        }

        let mut chain = Vec::new();
        let mut next = Some(value);
        while let Some(cur) = next {
            chain.push(parsed(cur));
            next = cur.source();
        }

        self.0.fields.insert(
            field.name().to_string(),
            serde_json::value::to_raw_value(&chain).unwrap(),
        );
    }
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.record_raw(field, format!("{value:?}"))
    }
}

fn level_from_tracing(lvl: &tracing::Level) -> LogLevel {
    match lvl.as_str() {
        "TRACE" => LogLevel::Trace,
        "DEBUG" => LogLevel::Debug,
        "INFO" => LogLevel::Info,
        "WARN" => LogLevel::Warn,
        "ERROR" => LogLevel::Error,
        other => unreachable!("{other:?} tracing::Level not handled"),
    }
}

#[cfg(test)]
mod test {
    use super::Layer;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_spans_and_events_are_mapped_to_structured_logs() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let out_clone = out.clone();

        let _guard = tracing_subscriber::registry()
            .with(
                Layer::new(move |log| out_clone.lock().unwrap().push(log), std::time::SystemTime::now)
                    .with_filter(tracing::level_filters::LevelFilter::DEBUG),
            )
            .set_default();

        let span = tracing::debug_span!("assembling toc", table = "public.foo");
        let _enter = span.enter();
        tracing::info!(rows = 40000_i64, "table flushed");

        let out = out.lock().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "table flushed");
        assert_eq!(out[0].spans.len(), 1);
        assert_eq!(out[0].spans[0].message, "assembling toc");
    }
}
