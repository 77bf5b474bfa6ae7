use std::time::Duration;

pub(crate) fn format_bytes(b: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if b >= GIB {
        return format!("{:.2}GiB", (b as f64) / (GIB as f64));
    }
    if b >= MIB {
        return format!("{:.2}MiB", (b as f64) / (MIB as f64));
    }
    if b >= KIB {
        return format!("{:.2}KiB", (b as f64) / (KIB as f64));
    }

    format!("{b}B")
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// Latency in milliseconds, switching to `us` below 1ms and `s` from 10s up.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() || ms < 0.0 {
        return "-".to_string();
    }
    if ms < 1.0 {
        return format!("{:.0}us", ms * 1000.0);
    }
    if ms >= 10_000.0 {
        return format!("{:.2}s", ms / 1000.0);
    }
    format!("{ms:.2}ms")
}

pub(crate) fn format_ms_opt(ms: Option<f64>) -> String {
    ms.map_or_else(|| "-".to_string(), format_ms)
}

pub(crate) fn format_percent(ratio: f64) -> String {
    if ratio.is_finite() {
        format!("{:.2}%", ratio * 100.0)
    } else {
        "-".to_string()
    }
}

/// Single rounded component in `s`, `ms` or `us`, keeping progress lines short.
pub(crate) fn format_duration(d: Duration) -> String {
    let total_us = d.as_micros();

    const US_PER_MS: u128 = 1_000;
    const US_PER_S: u128 = 1_000_000;

    fn round_div(value: u128, unit: u128) -> u128 {
        (value + (unit / 2)) / unit
    }

    if total_us >= US_PER_S {
        return format!("{}s", round_div(total_us, US_PER_S));
    }
    if total_us >= US_PER_MS {
        return format!("{}ms", round_div(total_us, US_PER_MS));
    }
    format!("{total_us}us")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00MiB");
    }

    #[test]
    fn latency_switches_units() {
        assert_eq!(format_ms(0.25), "250us");
        assert_eq!(format_ms(12.346), "12.35ms");
        assert_eq!(format_ms(12_500.0), "12.50s");
        assert_eq!(format_ms_opt(None), "-");
    }

    #[test]
    fn durations_round_to_one_unit() {
        assert_eq!(format_duration(Duration::from_millis(1_499)), "1s");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "2s");
        assert_eq!(format_duration(Duration::from_micros(2_600)), "3ms");
        assert_eq!(format_duration(Duration::from_micros(40)), "40us");
    }

    #[test]
    fn rates_and_percentages() {
        assert_eq!(format_rate(199.6), "200");
        assert_eq!(format_rate(f64::NAN), "0");
        assert_eq!(format_percent(0.1), "10.00%");
    }
}
