//! Price text normalization

use super::types::ExtractionError;

/// Parse a displayed price such as `₹1,234.50` or `Rs. 999`
///
/// Reads the first run of digits, `,` and `.` and drops the separators, so
/// currency prefixes like `Rs.` and trailing text like `(10% off)` are ignored.
pub fn parse_price(text: &str) -> Result<f64, ExtractionError> {
    let invalid = || ExtractionError::InvalidPriceFormat(text.trim().to_string());

    let digits = match text.find(|c: char| c.is_ascii_digit()) {
        Some(start) => &text[start..],
        None => return Err(invalid()),
    };
    let kept: String = digits
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| *c != ',')
        .collect();
    let cleaned = kept.trim_end_matches('.');

    if cleaned.is_empty() || cleaned.matches('.').count() > 1 {
        return Err(invalid());
    }

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rupee_with_separators() {
        assert_eq!(parse_price("₹1,234.50").unwrap(), 1234.50);
        assert_eq!(parse_price("  ₹ 79,999 ").unwrap(), 79999.0);
    }

    #[test]
    fn test_abbreviated_currency() {
        assert_eq!(parse_price("Rs. 1,499").unwrap(), 1499.0);
        assert_eq!(parse_price("INR 250.00").unwrap(), 250.0);
    }

    #[test]
    fn test_trailing_text_is_ignored() {
        assert_eq!(parse_price("₹1,234.50 (10% off)").unwrap(), 1234.50);
        assert_eq!(parse_price("₹54,999 ₹69,999 21% off").unwrap(), 54999.0);
    }

    #[test]
    fn test_zero_is_valid_format() {
        assert_eq!(parse_price("₹0").unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_formats() {
        assert!(matches!(
            parse_price("Currently unavailable"),
            Err(ExtractionError::InvalidPriceFormat(_))
        ));
        assert!(matches!(
            parse_price("1.234.56"),
            Err(ExtractionError::InvalidPriceFormat(_))
        ));
        assert!(parse_price("").is_err());
    }
}
