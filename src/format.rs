//! Number formatting for dashboard cards and tables.
//!
//! Report payloads come from the network and may carry `NaN`, infinities or
//! zero denominators. Everything here maps those to something displayable
//! instead of printing `NaN%`.

/// `value`, or `0.0` if it is not finite.
pub fn safe_number(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// `numerator / denominator`, or `0.0` when the result would not be finite.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    safe_number(safe_number(numerator) / denominator)
}

/// Change from `previous` to `current` in percent. `None` when there is no
/// meaningful baseline.
pub fn percent_change(previous: f64, current: f64) -> Option<f64> {
    if !previous.is_finite() || !current.is_finite() || previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous.abs() * 100.0)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `-$1,234.50` style amount with two decimals.
pub fn format_currency(amount: f64, symbol: &str) -> String {
    let amount = safe_number(amount);
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    // Rounding can turn -0.001 into "0.00"; don't print "-$0.00".
    let negative = amount < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    format!(
        "{}{symbol}{}.{cents}",
        if negative { "-" } else { "" },
        group_thousands(whole)
    )
}

pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, safe_number(value))
}

/// Short form for large counts: `950`, `1.2K`, `3.4M`, `2B`.
pub fn format_compact(value: f64) -> String {
    const UNITS: [(f64, &str); 3] = [(1e3, "K"), (1e6, "M"), (1e9, "B")];
    let tenths = |x: f64| (x * 10.0).round() / 10.0;

    let value = safe_number(value);
    if value.round().abs() < 1e3 {
        return format!("{}", value.round());
    }
    // The suffix is picked after rounding, so 999_999 reads 1M rather than 1000K.
    let (scaled, suffix) = UNITS
        .iter()
        .map(|&(unit, suffix)| (tenths(value / unit), suffix))
        .find(|(scaled, _)| scaled.abs() < 1e3)
        .unwrap_or((tenths(value / 1e9), "B"));

    let text = format!("{scaled:.1}");
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{text}{suffix}")
}

/// Parse a user-typed amount such as `$1,250.00`, `1250`, `-40` or `(40.00)`.
pub fn parse_amount(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    let (negative, body) = match trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) => (true, inner.trim()),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value.abs() } else { value })
}
