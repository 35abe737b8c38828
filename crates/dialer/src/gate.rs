//! Schedule gate: pure admission decision for one tenant at one instant.

use chrono::{DateTime, Datelike, Timelike, Utc};
use database::{ScheduleConfig, ScheduleWindow};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::holiday::HolidayCalendar;

const SECS_PER_DAY: i64 = 86_400;

/// Why dialing is (not) admitted right now. Checks run in declaration
/// order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionState {
    DisabledManual,
    DisabledByDialer,
    HolidayBlocked,
    OutsideWindow,
    WalletInsufficient,
    Allowed,
}

impl AdmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionState::DisabledManual => "DISABLED_MANUAL",
            AdmissionState::DisabledByDialer => "DISABLED_BY_DIALER",
            AdmissionState::HolidayBlocked => "HOLIDAY_BLOCKED",
            AdmissionState::OutsideWindow => "OUTSIDE_WINDOW",
            AdmissionState::WalletInsufficient => "WALLET_INSUFFICIENT",
            AdmissionState::Allowed => "ALLOWED",
        }
    }
}

/// Gate verdict plus a retry hint for blocked dialers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub state: AdmissionState,
    pub retry_after_secs: Option<i64>,
}

impl GateDecision {
    pub fn allowed(&self) -> bool {
        self.state == AdmissionState::Allowed
    }

    fn blocked(state: AdmissionState, retry_after_secs: i64) -> Self {
        Self {
            state,
            retry_after_secs: Some(retry_after_secs),
        }
    }
}

/// Evaluate admission for a tenant. Pure: all inputs are explicit, all
/// time comparisons happen in the engine's fixed civil offset.
pub fn evaluate(
    config: &ScheduleConfig,
    windows: &[ScheduleWindow],
    holidays: &dyn HolidayCalendar,
    engine: &EngineConfig,
    now: DateTime<Utc>,
) -> GateDecision {
    let local = now.with_timezone(&engine.tz_offset);
    let now_secs = i64::from(local.num_seconds_from_midnight());

    if !config.enabled {
        return GateDecision::blocked(AdmissionState::DisabledManual, engine.retry_fallback_secs);
    }

    if config.disabled_by_dialer {
        return GateDecision::blocked(
            AdmissionState::DisabledByDialer,
            engine.retry_fallback_secs,
        );
    }

    if config.skip_holidays && holidays.is_holiday(local.date_naive()) {
        // Try again at the next local midnight.
        return GateDecision::blocked(AdmissionState::HolidayBlocked, SECS_PER_DAY - now_secs);
    }

    let today = weekday_sat0(&local);
    let in_window = windows.iter().any(|w| {
        w.day_of_week == today && w.start_min * 60 <= now_secs && now_secs < w.end_min * 60
    });
    if !in_window {
        let retry = next_window_start_secs(windows, today, now_secs)
            .unwrap_or(engine.retry_fallback_secs);
        return GateDecision::blocked(AdmissionState::OutsideWindow, retry);
    }

    if config.wallet_balance < config.cost_per_connected {
        return GateDecision::blocked(
            AdmissionState::WalletInsufficient,
            engine.retry_fallback_secs,
        );
    }

    GateDecision {
        state: AdmissionState::Allowed,
        retry_after_secs: None,
    }
}

/// Day-of-week with Saturday = 0, matching the stored window convention.
fn weekday_sat0(local: &DateTime<chrono::FixedOffset>) -> i64 {
    i64::from((local.weekday().num_days_from_sunday() + 1) % 7)
}

/// Seconds until the next configured window start, scanning forward up to
/// seven days. None when the tenant has no windows at all.
fn next_window_start_secs(windows: &[ScheduleWindow], today: i64, now_secs: i64) -> Option<i64> {
    if windows.is_empty() {
        return None;
    }
    let mut best: Option<i64> = None;
    for day_offset in 0..=7i64 {
        let day = (today + day_offset) % 7;
        for w in windows.iter().filter(|w| w.day_of_week == day) {
            let start_secs = w.start_min * 60;
            let delta = day_offset * SECS_PER_DAY + start_secs - now_secs;
            if delta > 0 && best.map_or(true, |b| delta < b) {
                best = Some(delta);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holiday::HolidayTable;
    use chrono::{NaiveDate, TimeZone};

    fn config(enabled: bool, balance: i64, cost: i64) -> ScheduleConfig {
        ScheduleConfig {
            id: 1,
            tenant_id: 1,
            enabled,
            disabled_by_dialer: false,
            skip_holidays: true,
            wallet_balance: balance,
            cost_per_connected: cost,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    fn window(day_of_week: i64, start_min: i64, end_min: i64) -> ScheduleWindow {
        ScheduleWindow {
            id: 0,
            tenant_id: 1,
            day_of_week,
            start_min,
            end_min,
        }
    }

    // 2026-02-02 is a Monday; 10:33 UTC is 14:03 in Tehran.
    fn monday_afternoon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 10, 33, 0).unwrap()
    }

    // Monday with Saturday = 0.
    const MONDAY: i64 = 2;

    #[test]
    fn test_allowed_inside_window_with_funds() {
        let engine = EngineConfig::tehran();
        let windows = [window(MONDAY, 9 * 60, 18 * 60)];
        let decision = evaluate(
            &config(true, 10_000, 500),
            &windows,
            &HolidayTable::default(),
            &engine,
            monday_afternoon(),
        );
        assert_eq!(decision.state, AdmissionState::Allowed);
        assert_eq!(decision.retry_after_secs, None);
    }

    #[test]
    fn test_disabled_manual_wins_over_everything() {
        let engine = EngineConfig::tehran();
        let holidays =
            HolidayTable::new([NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()]);
        let decision = evaluate(
            &config(false, 0, 500),
            &[],
            &holidays,
            &engine,
            monday_afternoon(),
        );
        assert_eq!(decision.state, AdmissionState::DisabledManual);
        assert_eq!(decision.retry_after_secs, Some(engine.retry_fallback_secs));
    }

    #[test]
    fn test_disabled_by_dialer_beats_holiday() {
        let engine = EngineConfig::tehran();
        let mut cfg = config(true, 10_000, 500);
        cfg.disabled_by_dialer = true;
        let holidays =
            HolidayTable::new([NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()]);
        let decision = evaluate(&cfg, &[], &holidays, &engine, monday_afternoon());
        assert_eq!(decision.state, AdmissionState::DisabledByDialer);
    }

    #[test]
    fn test_holiday_blocks_until_local_midnight() {
        let engine = EngineConfig::tehran();
        let holidays =
            HolidayTable::new([NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()]);
        let windows = [window(MONDAY, 9 * 60, 18 * 60)];
        let decision = evaluate(
            &config(true, 10_000, 500),
            &windows,
            &holidays,
            &engine,
            monday_afternoon(),
        );
        assert_eq!(decision.state, AdmissionState::HolidayBlocked);
        // Local time is 14:03; midnight is 9h57m away.
        assert_eq!(decision.retry_after_secs, Some((24 * 3600) - (14 * 3600 + 3 * 60)));
    }

    #[test]
    fn test_holiday_ignored_when_skip_disabled() {
        let engine = EngineConfig::tehran();
        let mut cfg = config(true, 10_000, 500);
        cfg.skip_holidays = false;
        let holidays =
            HolidayTable::new([NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()]);
        let windows = [window(MONDAY, 9 * 60, 18 * 60)];
        let decision = evaluate(&cfg, &windows, &holidays, &engine, monday_afternoon());
        assert_eq!(decision.state, AdmissionState::Allowed);
    }

    #[test]
    fn test_outside_window_retry_points_at_next_start() {
        let engine = EngineConfig::tehran();
        // Window later the same local day: 16:00-18:00, now 14:03.
        let windows = [window(MONDAY, 16 * 60, 18 * 60)];
        let decision = evaluate(
            &config(true, 10_000, 500),
            &windows,
            &HolidayTable::default(),
            &engine,
            monday_afternoon(),
        );
        assert_eq!(decision.state, AdmissionState::OutsideWindow);
        assert_eq!(decision.retry_after_secs, Some((16 * 60 - (14 * 60 + 3)) * 60));
    }

    #[test]
    fn test_outside_window_scans_into_next_week() {
        let engine = EngineConfig::tehran();
        // Only window is Saturday morning; now is Monday afternoon.
        let windows = [window(0, 9 * 60, 12 * 60)];
        let decision = evaluate(
            &config(true, 10_000, 500),
            &windows,
            &HolidayTable::default(),
            &engine,
            monday_afternoon(),
        );
        assert_eq!(decision.state, AdmissionState::OutsideWindow);
        // Saturday is 5 days after Monday.
        let expected = 5 * 86_400 + 9 * 3600 - (14 * 3600 + 3 * 60);
        assert_eq!(decision.retry_after_secs, Some(expected));
    }

    #[test]
    fn test_no_windows_falls_back_to_default_retry() {
        let engine = EngineConfig::tehran();
        let decision = evaluate(
            &config(true, 10_000, 500),
            &[],
            &HolidayTable::default(),
            &engine,
            monday_afternoon(),
        );
        assert_eq!(decision.state, AdmissionState::OutsideWindow);
        assert_eq!(decision.retry_after_secs, Some(engine.retry_fallback_secs));
    }

    #[test]
    fn test_window_end_is_exclusive() {
        let engine = EngineConfig::tehran();
        // Window ends exactly at 14:03 local.
        let windows = [window(MONDAY, 9 * 60, 14 * 60 + 3)];
        let decision = evaluate(
            &config(true, 10_000, 500),
            &windows,
            &HolidayTable::default(),
            &engine,
            monday_afternoon(),
        );
        assert_eq!(decision.state, AdmissionState::OutsideWindow);
    }

    #[test]
    fn test_wallet_insufficient_blocks_last() {
        let engine = EngineConfig::tehran();
        let windows = [window(MONDAY, 9 * 60, 18 * 60)];
        let decision = evaluate(
            &config(true, 499, 500),
            &windows,
            &HolidayTable::default(),
            &engine,
            monday_afternoon(),
        );
        assert_eq!(decision.state, AdmissionState::WalletInsufficient);
        assert_eq!(decision.retry_after_secs, Some(engine.retry_fallback_secs));
    }

    #[test]
    fn test_zero_cost_tenant_is_allowed_with_zero_balance() {
        let engine = EngineConfig::tehran();
        let windows = [window(MONDAY, 9 * 60, 18 * 60)];
        let decision = evaluate(
            &config(true, 0, 0),
            &windows,
            &HolidayTable::default(),
            &engine,
            monday_afternoon(),
        );
        assert_eq!(decision.state, AdmissionState::Allowed);
    }
}
