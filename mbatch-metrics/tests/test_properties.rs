use chrono::{DateTime, TimeZone, Utc};
use mbatch_metrics::{
    Batch, Event, Formatter, FormatterConfig, LogContext, MetricCategory, RecordBuilder,
};
use similar_asserts::assert_eq;

fn time(secs: i64, millis: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, millis * 1_000_000).unwrap()
}

/// A mixed set of events covering all paths through the record builder.
fn mixed_events() -> Vec<Event> {
    vec![
        Event::new("/orders/create", time(100, 10)).with_duration(10.0),
        Event::new("/orders/create", time(100, 500)).with_duration(30.0),
        Event::new("/orders/create", time(100, 990)).with_amount(4.0),
        Event::new("/orders/cancel", time(101, 0)),
        Event::new("/billing/invoice/send", time(101, 0))
            .with_duration(12.0)
            .with_dimension("region", "eu"),
        Event::new("/billing/invoice/send", time(101, 300))
            .with_duration(18.0)
            .with_dimension("region", "eu"),
        Event::new("/ping", time(102, 0)).with_tag("region", "us"),
    ]
}

fn formatter() -> Formatter {
    let config = FormatterConfig {
        dimensions: ["region".to_owned()].into(),
        ..Default::default()
    };

    Formatter::new(config, LogContext::new(Some("web-1".to_owned()), None))
}

fn assert_unique_keys(batch: &Batch) {
    for category in [MetricCategory::Gauge, MetricCategory::Counter] {
        let records = batch.get(category);
        for (i, a) in records.iter().enumerate() {
            for b in &records[i + 1..] {
                let same_key = a.timestamp == b.timestamp
                    && a.metric == b.metric
                    && a.dimensions == b.dimensions;
                assert!(!same_key, "duplicate {category} record: {a:?}");
            }
        }
    }
}

#[test]
fn test_counter_events_have_no_derived_record() {
    mbatch_test::setup();
    let config = FormatterConfig::default();
    let builder = RecordBuilder::new(&config);

    for event in mixed_events() {
        if event.duration.is_some() || event.explicit_dimensions.is_some() {
            continue;
        }

        let built = builder.build(&event, &LogContext::default()).unwrap();
        assert_eq!(built.category, MetricCategory::Counter);
        assert_eq!(built.derived_counter, None);
    }
}

#[test]
fn test_timed_events_produce_two_records() {
    let config = FormatterConfig::default();
    let builder = RecordBuilder::new(&config);

    for event in mixed_events() {
        if event.duration.is_none() || event.explicit_dimensions.is_some() {
            continue;
        }

        let built = builder.build(&event, &LogContext::default()).unwrap();
        let records: Vec<_> = built.into_records().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1.dimensions, records[1].1.dimensions);
    }
}

#[test]
fn test_metric_path_splitting() {
    let config = FormatterConfig::default();
    let builder = RecordBuilder::new(&config);
    let context = LogContext::default();

    let explicit = Event::new("/a/b/c", time(1, 0)).with_dimension("k", "v");
    let built = builder.build(&explicit, &context).unwrap();
    assert_eq!(built.metric.metric, "a.b.c");

    let implicit = Event::new("/a/b/c", time(1, 0));
    let built = builder.build(&implicit, &context).unwrap();
    assert_eq!(built.metric.dimensions["class"], "a::b");
    assert_eq!(built.metric.dimensions["action"], "c");
}

#[test]
fn test_aggregating_twice_doubles_counters() {
    let formatter = formatter();
    let events = mixed_events();
    let doubled: Vec<_> = events.iter().chain(&events).cloned().collect();

    let once = formatter.format_batch(&events).unwrap();
    let twice = formatter.format_batch(&doubled).unwrap();

    assert_eq!(once.gauge, twice.gauge);
    assert_eq!(once.counter.len(), twice.counter.len());
    for (single, double) in once.counter.iter().zip(&twice.counter) {
        assert_eq!(double.value, single.value * 2.0);
        assert_eq!(double.dimensions, single.dimensions);
    }
}

#[test]
fn test_aggregated_keys_are_unique() {
    let formatter = formatter();
    let events = mixed_events();
    let doubled: Vec<_> = events.iter().chain(&events).cloned().collect();

    assert_unique_keys(&formatter.format_batch(&doubled).unwrap());
}

#[test]
fn test_mixed_batch() {
    let batch = formatter().format_batch(&mixed_events()).unwrap();

    let gauges: Vec<_> = batch
        .gauge
        .iter()
        .map(|r| (r.metric.as_str(), r.timestamp.as_millis(), r.value))
        .collect();
    assert_eq!(
        gauges,
        [
            ("Application.average", 100_000, 20.0),
            ("billing.invoice.send", 101_000, 15.0),
        ]
    );

    let counters: Vec<_> = batch
        .counter
        .iter()
        .map(|r| (r.dimensions["action"].as_str(), r.timestamp.as_millis(), r.value))
        .collect();
    assert_eq!(
        counters,
        [("create", 100_000, 6.0), ("cancel", 101_000, 1.0), ("ping", 102_000, 1.0)]
    );

    let ping = &batch.counter[2];
    assert_eq!(ping.dimensions["region"], "us");
    assert_eq!(ping.dimensions["host"], "web-1");
    assert_eq!(ping.dimensions["class"], "Unknown");
}

#[test]
fn test_timestamp_truncation() {
    let event = Event::new("/a", time(12, 999));
    let batch = Formatter::default().format_event(&event).unwrap();
    assert_eq!(batch.counter[0].timestamp.as_millis(), 12_000);
}

#[test]
fn test_pre_epoch_timestamps_floor() {
    let event = Event::new("/a/b", time(-5, 500));
    let batch = Formatter::default().format_event(&event).unwrap();
    assert_eq!(batch.counter[0].timestamp.as_millis(), -5_000);

    let event = Event::from_json(r#"{"metricPath": "/a/b", "time": -0.5}"#, 0).unwrap();
    let batch = Formatter::default().format_event(&event).unwrap();
    assert_eq!(
        batch.to_json().unwrap(),
        r#"{"counter":[{"metric":"Application.counter","timestamp":-1000,"value":1,"dimensions":{"action":"b","class":"a"}}]}"#
    );
}

#[test]
fn test_parse_and_aggregate_json_lines() {
    let lines = [
        r#"{"metricPath": "/orders/create", "duration": 10, "time": 12.1}"#,
        r#"{"metricPath": "/orders/create", "duration": 20, "time": "1970-01-01T00:00:12.9Z"}"#,
        r#"{"metricPath": "/orders/create", "duration": 30, "time": 12}"#,
    ];

    let events: Vec<_> = lines
        .iter()
        .enumerate()
        .map(|(index, line)| Event::from_json(line, index).unwrap())
        .collect();

    let batch = Formatter::default().format_batch(&events).unwrap();
    assert_eq!(
        batch.to_json().unwrap(),
        concat!(
            r#"{"gauge":[{"metric":"Application.average","timestamp":12000,"value":20,"#,
            r#""dimensions":{"action":"create","class":"orders"}}],"#,
            r#""counter":[{"metric":"Application.counter","timestamp":12000,"value":3,"#,
            r#""dimensions":{"action":"create","class":"orders"}}]}"#,
        )
    );
}
