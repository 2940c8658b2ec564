pub mod checkpoints;
pub mod inspect;
pub mod timeline;
pub mod verify;

/// Block timestamps are float seconds.
pub(crate) fn format_timestamp(ts: f64) -> String {
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9) as u32;
    chrono::DateTime::from_timestamp(secs as i64, nanos)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub(crate) fn format_millis(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
