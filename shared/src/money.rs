//! Money helpers
//!
//! All stored amounts are `i64` paisa. Conversion to rupees happens only when
//! rendering text for humans (notifications, invoices).

use rust_decimal::Decimal;

/// Convert minor units (paisa) to major units (rupees), scale 2
pub fn to_major(amount_minor: i64) -> Decimal {
    Decimal::new(amount_minor, 2)
}

/// Human-readable rupee amount, e.g. `Rs. 1250.00`
pub fn format_inr(amount_minor: i64) -> String {
    format!("Rs. {}", to_major(amount_minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_major() {
        assert_eq!(to_major(125_050).to_string(), "1250.50");
        assert_eq!(to_major(0).to_string(), "0.00");
        assert_eq!(to_major(5).to_string(), "0.05");
    }

    #[test]
    fn test_format_inr() {
        assert_eq!(format_inr(49_900), "Rs. 499.00");
    }
}
