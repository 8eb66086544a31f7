//! Sample/time conversions and display formatting.
//!
//! Conversions return 0 for non-positive sample rates instead of failing,
//! so marker bookkeeping stays total even before a track is loaded.

/// Converts a sample count to whole milliseconds (truncating).
#[inline]
pub fn samples_to_ms(samples: i64, sample_rate: i64) -> i64 {
    if sample_rate <= 0 {
        return 0;
    }
    samples.saturating_mul(1000) / sample_rate
}

/// Converts milliseconds to a sample count (truncating).
#[inline]
pub fn ms_to_samples(ms: i64, sample_rate: i64) -> i64 {
    if sample_rate <= 0 {
        return 0;
    }
    ms.saturating_mul(sample_rate) / 1000
}

/// Converts a sample count to seconds.
#[inline]
pub fn samples_to_seconds(samples: i64, sample_rate: i64) -> f64 {
    if sample_rate <= 0 {
        return 0.0;
    }
    samples as f64 / sample_rate as f64
}

/// Converts seconds to a sample count (truncating toward zero).
#[inline]
pub fn seconds_to_samples(seconds: f64, sample_rate: i64) -> i64 {
    if sample_rate <= 0 {
        return 0;
    }
    (seconds * sample_rate as f64) as i64
}

/// Formats milliseconds as `MM:SS.t` where `t` is tenths of a second.
///
/// Negative inputs render as `00:00.0`.
pub fn format_time(ms: i64) -> String {
    let ms = ms.max(0);
    let total_secs = ms / 1000;
    format!(
        "{:02}:{:02}.{}",
        total_secs / 60,
        total_secs % 60,
        (ms % 1000) / 100
    )
}

/// Formats milliseconds as `MM:SS`.
pub fn format_time_short(ms: i64) -> String {
    let total_secs = ms.max(0) / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Formats seconds as `MM:SS.t`.
pub fn format_seconds(seconds: f64) -> String {
    format_time((seconds * 1000.0) as i64)
}
