use chrono::FixedOffset;

/// Wallet-side settings: the civil timezone bank timestamps are written
/// in, which senders count as banks, and the matching tolerance.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub tz_offset: FixedOffset,
    /// Sender-ID prefixes that classify a message as a bank notification.
    pub bank_sender_prefixes: Vec<String>,
    /// Half-width of the matching window around a claimed timestamp.
    pub match_tolerance_secs: i64,
}

impl WalletConfig {
    /// Tehran civil time, UTC+03:30 year-round.
    pub fn tehran(bank_sender_prefixes: Vec<String>) -> Self {
        Self {
            tz_offset: FixedOffset::east_opt(3 * 3600 + 30 * 60).expect("valid offset"),
            bank_sender_prefixes,
            match_tolerance_secs: 120,
        }
    }

    pub fn is_bank_sender(&self, sender: &str) -> bool {
        self.bank_sender_prefixes
            .iter()
            .any(|p| sender.starts_with(p.as_str()))
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self::tehran(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_sender_classification() {
        let config = WalletConfig::tehran(vec!["+9820".to_string(), "Bank".to_string()]);
        assert!(config.is_bank_sender("+982000075"));
        assert!(config.is_bank_sender("BankMellat"));
        assert!(!config.is_bank_sender("09121234567"));

        let empty = WalletConfig::default();
        assert!(!empty.is_bank_sender("+982000075"));
    }
}
