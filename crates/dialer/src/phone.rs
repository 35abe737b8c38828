//! Phone number normalization for the Iranian mobile format.

/// Normalize a raw phone string to the canonical `09XXXXXXXXX` form.
/// Returns None when the input cannot be a valid mobile number.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(rest) = digits.strip_prefix("0098") {
        digits = format!("0{rest}");
    } else if digits.starts_with("98") && digits.len() == 12 {
        digits = format!("0{}", &digits[2..]);
    }
    if digits.starts_with('9') && digits.len() == 10 {
        digits = format!("0{digits}");
    }

    if digits.len() == 11 && digits.starts_with("09") {
        Some(digits)
    } else {
        None
    }
}
