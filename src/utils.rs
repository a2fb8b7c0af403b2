//! Display helpers

/// Human readable large number with an optional currency suffix
///
/// `1_234_567.0, "USDT"` becomes `1.23M USDT`.
pub fn format_large_number(num: Option<f64>, currency: &str) -> String {
    let num = match num {
        Some(n) if n.is_finite() => n,
        _ => return "N/A".to_string(),
    };

    let abs = num.abs();
    let sign = if num < 0.0 { "-" } else { "" };
    let value = if abs >= 1e12 {
        format!("{:.2}T", abs / 1e12)
    } else if abs >= 1e9 {
        format!("{:.2}B", abs / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", abs / 1e6)
    } else if abs >= 1e3 {
        format!("{:.2}K", abs / 1e3)
    } else {
        format!("{:.0}", abs)
    };

    format!("{}{} {}", sign, value, currency).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_large_number() {
        assert_eq!(format_large_number(Some(1_234_567.0), "USDT"), "1.23M USDT");
        assert_eq!(format_large_number(Some(2_500_000_000.0), "USDT"), "2.50B USDT");
        assert_eq!(format_large_number(Some(3.2e12), ""), "3.20T");
        assert_eq!(format_large_number(Some(15_300.0), "USDT"), "15.30K USDT");
        assert_eq!(format_large_number(Some(999.4), "USDT"), "999 USDT");
        assert_eq!(format_large_number(Some(-4_000.0), "USDT"), "-4.00K USDT");
    }

    #[test]
    fn test_format_missing_volume() {
        assert_eq!(format_large_number(None, "USDT"), "N/A");
        assert_eq!(format_large_number(Some(f64::NAN), "USDT"), "N/A");
    }
}
