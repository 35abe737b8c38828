//! Bank SMS body parser.
//!
//! Bank deposit notifications are free-form text, but two tokens are
//! stable across banks: a comma-grouped amount immediately followed by a
//! sign (`70,000,000+`) and a Jalali timestamp (`1404/11/13-14:03`). The
//! parser scans for those tokens; everything else in the body is ignored.

use chrono::{DateTime, FixedOffset, Utc};
use thiserror::Error;

use crate::jalali::{self, JalaliError};

/// Why a body could not be parsed. The stable code string is persisted
/// with the raw message so operators can audit rejected SMS.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No comma-grouped amount followed by `+` or `-` anywhere in the body.
    #[error("amount_sign_not_found")]
    AmountSignNotFound,

    /// A date token was recognized but its fields are invalid.
    #[error("invalid transaction date: {0}")]
    InvalidDate(#[from] JalaliError),
}

impl ParseError {
    /// Stable error code stored alongside the raw SMS.
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::AmountSignNotFound => "amount_sign_not_found",
            ParseError::InvalidDate(_) => "invalid_transaction_date",
        }
    }
}

/// Extracted fields of one bank SMS body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBankSms {
    pub amount_rial: i64,
    pub amount_toman: i64,
    pub is_credit: bool,
    /// UTC instant of the bank-side transaction; `None` when the body
    /// carried no recognizable date token.
    pub transaction_at: Option<DateTime<Utc>>,
}

impl ParsedBankSms {
    /// Only credits can fund a wallet; debits are parsed but never
    /// eligible for matching.
    pub fn should_store(&self) -> bool {
        self.is_credit
    }
}

/// Parse a bank SMS body. The amount is mandatory; the date is optional
/// but, once its `YYYY/MM/DD` shape is recognized, must be valid.
pub fn parse_bank_sms(body: &str, tz: &FixedOffset) -> Result<ParsedBankSms, ParseError> {
    let bytes = body.as_bytes();
    let (amount_rial, is_credit) =
        find_signed_amount(bytes).ok_or(ParseError::AmountSignNotFound)?;
    let transaction_at = find_transaction_at(bytes, tz)?;

    Ok(ParsedBankSms {
        amount_rial,
        amount_toman: amount_rial / 10,
        is_credit,
        transaction_at,
    })
}

/// First token of the form `d{1,3}(,d{3})+` immediately followed by a
/// sign byte. The mandatory comma grouping keeps date fragments like
/// `13-` from matching.
fn find_signed_amount(bytes: &[u8]) -> Option<(i64, bool)> {
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        let mut j = i;
        while j < bytes.len() && (bytes[j].is_ascii_digit() || bytes[j] == b',') {
            j += 1;
        }
        if j < bytes.len()
            && (bytes[j] == b'+' || bytes[j] == b'-')
            && is_grouped_amount(&bytes[start..j])
        {
            let digits: String = bytes[start..j]
                .iter()
                .filter(|b| b.is_ascii_digit())
                .map(|&b| b as char)
                .collect();
            if let Ok(value) = digits.parse::<i64>() {
                return Some((value, bytes[j] == b'+'));
            }
        }
        i = j.max(i + 1);
    }
    None
}

fn is_grouped_amount(run: &[u8]) -> bool {
    let mut groups = run.split(|&b| b == b',');
    let head = match groups.next() {
        Some(h) => h,
        None => return false,
    };
    if head.is_empty() || head.len() > 3 || !head.iter().all(u8::is_ascii_digit) {
        return false;
    }
    let mut seen_group = false;
    for group in groups {
        if group.len() != 3 || !group.iter().all(u8::is_ascii_digit) {
            return false;
        }
        seen_group = true;
    }
    seen_group
}

/// First token of the form `YYYY/MM/DD-HH:MM`. Returns `Ok(None)` when no
/// date shape is present at all; a recognized but malformed token is an
/// error, not a silent skip.
fn find_transaction_at(
    bytes: &[u8],
    tz: &FixedOffset,
) -> Result<Option<DateTime<Utc>>, ParseError> {
    let mut i = 0;
    while i + 10 <= bytes.len() {
        if i > 0 && bytes[i - 1].is_ascii_digit() {
            i += 1;
            continue;
        }
        let is_date = bytes[i..i + 4].iter().all(u8::is_ascii_digit)
            && bytes[i + 4] == b'/'
            && bytes[i + 5..i + 7].iter().all(u8::is_ascii_digit)
            && bytes[i + 7] == b'/'
            && bytes[i + 8..i + 10].iter().all(u8::is_ascii_digit);
        if !is_date {
            i += 1;
            continue;
        }

        let time_ok = i + 16 <= bytes.len()
            && bytes[i + 10] == b'-'
            && bytes[i + 11..i + 13].iter().all(u8::is_ascii_digit)
            && bytes[i + 13] == b':'
            && bytes[i + 14..i + 16].iter().all(u8::is_ascii_digit);
        if !time_ok {
            let token = String::from_utf8_lossy(&bytes[i..i + 10]).into_owned();
            return Err(ParseError::InvalidDate(JalaliError::BadFormat(token)));
        }

        let field = |a: usize, b: usize| -> i64 {
            bytes[i + a..i + b]
                .iter()
                .fold(0i64, |acc, &d| acc * 10 + i64::from(d - b'0'))
        };
        let (jy, jm, jd) = (field(0, 4), field(5, 7), field(8, 10));
        let (hour, minute) = (field(11, 13) as u32, field(14, 16) as u32);

        let instant = jalali::to_utc(jy, jm, jd, hour, minute, tz)?;
        return Ok(Some(instant));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tehran() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600 + 30 * 60).unwrap()
    }

    #[test]
    fn test_parses_credit_with_date() {
        let body = "362970014368052001\n70,000,000+\n1404/11/13-14:03\nمانده:70,694,954";
        let parsed = parse_bank_sms(body, &tehran()).unwrap();
        assert_eq!(parsed.amount_rial, 70_000_000);
        assert_eq!(parsed.amount_toman, 7_000_000);
        assert!(parsed.is_credit);
        assert!(parsed.should_store());
        assert_eq!(
            parsed.transaction_at,
            Some(Utc.with_ymd_and_hms(2026, 2, 2, 10, 33, 0).unwrap())
        );
    }

    #[test]
    fn test_parses_debit() {
        let body = "برداشت\n1,500,000-\n1404/11/13-09:00";
        let parsed = parse_bank_sms(body, &tehran()).unwrap();
        assert_eq!(parsed.amount_rial, 1_500_000);
        assert!(!parsed.is_credit);
        assert!(!parsed.should_store());
    }

    #[test]
    fn test_date_fragment_does_not_match_as_amount() {
        // "13-" inside the date token must not be read as a signed amount.
        let body = "1404/11/13-14:03\nبدون مبلغ";
        let err = parse_bank_sms(body, &tehran()).unwrap_err();
        assert_eq!(err, ParseError::AmountSignNotFound);
        assert_eq!(err.code(), "amount_sign_not_found");
    }

    #[test]
    fn test_missing_date_is_not_an_error() {
        let parsed = parse_bank_sms("واریز 2,000,000+", &tehran()).unwrap();
        assert_eq!(parsed.amount_rial, 2_000_000);
        assert_eq!(parsed.transaction_at, None);
    }

    #[test]
    fn test_recognized_but_malformed_date_is_an_error() {
        // Date shape present, time part missing.
        let body = "50,000+\n1404/11/13 14:03";
        let err = parse_bank_sms(body, &tehran()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidDate(JalaliError::BadFormat(_))));

        // Valid shape, impossible calendar fields.
        let body = "50,000+\n1404/13/01-10:00";
        let err = parse_bank_sms(body, &tehran()).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidDate(JalaliError::MonthOutOfRange(13))
        ));
    }

    #[test]
    fn test_ungrouped_digits_never_match() {
        // Long account numbers and small ungrouped figures carry no commas.
        assert_eq!(
            parse_bank_sms("3629700143+", &tehran()).unwrap_err(),
            ParseError::AmountSignNotFound
        );
        assert_eq!(
            parse_bank_sms("500+", &tehran()).unwrap_err(),
            ParseError::AmountSignNotFound
        );
    }

    #[test]
    fn test_first_signed_amount_wins() {
        let body = "1,000+ و سپس 2,000-";
        let parsed = parse_bank_sms(body, &tehran()).unwrap();
        assert_eq!(parsed.amount_rial, 1_000);
        assert!(parsed.is_credit);
    }
}
