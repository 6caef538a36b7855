//! # Receipt Numbers
//!
//! Receipt numbers are generated on the register so a sale can be printed
//! while offline. Format: `YYYYMMDD-DC-NNNN`
//!
//! - `YYYYMMDD`: date of the sale (UTC)
//! - `DC`: device code, last two characters of the device id, uppercased
//! - `NNNN`: random 4-digit sequence
//!
//! Two registers can still collide on the server; that surfaces as a
//! `duplicate-receipt-number` conflict and is settled with
//! [`regenerate_receipt_number`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Two-character device code derived from the device id (`"00"` if too short).
pub fn device_code(device_id: &str) -> String {
    let chars: Vec<char> = device_id.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if chars.len() < 2 {
        return "00".to_string();
    }
    chars[chars.len() - 2..]
        .iter()
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Generates a receipt number for `device_id` at `now`.
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use shopline_core::receipt::generate_receipt_number;
///
/// let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
/// let number = generate_receipt_number("register-3f", now);
/// assert!(number.starts_with("20261017-3F-"));
/// assert_eq!(number.len(), 16);
/// ```
pub fn generate_receipt_number(device_id: &str, now: DateTime<Utc>) -> String {
    let seq = Uuid::new_v4().as_u128() % 10_000;
    format!(
        "{}-{}-{:04}",
        now.format("%Y%m%d"),
        device_code(device_id),
        seq
    )
}

/// Generates a number guaranteed to differ from `previous`.
pub fn regenerate_receipt_number(previous: &str, device_id: &str, now: DateTime<Utc>) -> String {
    loop {
        let candidate = generate_receipt_number(device_id, now);
        if candidate != previous {
            return candidate;
        }
    }
}

/// Whether `value` has the locally generated shape.
pub fn is_local_format(value: &str) -> bool {
    let parts: Vec<&str> = value.split('-').collect();
    matches!(
        parts.as_slice(),
        [date, code, seq]
            if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit())
                && code.len() == 2 && code.chars().all(|c| c.is_ascii_alphanumeric())
                && seq.len() == 4 && seq.chars().all(|c| c.is_ascii_digit())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::at;

    #[test]
    fn test_device_code() {
        assert_eq!(device_code("7c9e6679-7425-40de-944b-e07fc1f90ae7"), "E7");
        assert_eq!(device_code("register-01"), "01");
        assert_eq!(device_code("x"), "00");
        assert_eq!(device_code(""), "00");
    }

    #[test]
    fn test_generated_number_has_local_format() {
        let number = generate_receipt_number("register-3f", at(0));
        assert!(is_local_format(&number), "{number}");
        assert!(number.contains("-3F-"));
    }

    #[test]
    fn test_regenerate_differs_from_previous() {
        let previous = generate_receipt_number("register-3f", at(0));
        for _ in 0..50 {
            assert_ne!(regenerate_receipt_number(&previous, "register-3f", at(0)), previous);
        }
    }

    #[test]
    fn test_is_local_format_rejects_others() {
        assert!(is_local_format("20261017-3F-0042"));
        assert!(!is_local_format("R-1001"));
        assert!(!is_local_format("2026101-3F-0042"));
        assert!(!is_local_format("20261017-3F-42"));
    }
}
