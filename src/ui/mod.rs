mod layout;

pub use layout::draw_ui;

/// Formats a finished measurement: whole milliseconds for latency, fewer
/// decimals the larger the throughput.
pub fn format_metric(value: f64, unit: &str) -> String {
    let number = if unit == "ms" || value >= 100.0 {
        format!("{:.0}", value)
    } else if value >= 1.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.2}", value)
    };
    format!("{} {}", number, unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_formatting() {
        assert_eq!(format_metric(19.6, "ms"), "20 ms");
        assert_eq!(format_metric(250.4, "Mbps"), "250 Mbps");
        assert_eq!(format_metric(80.04, "Mbps"), "80.0 Mbps");
        assert_eq!(format_metric(0.456, "Mbps"), "0.46 Mbps");
    }
}
