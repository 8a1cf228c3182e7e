//! Consecutive-day login streak for superuser accounts.

use chrono::NaiveDate;

use crate::storage::StreakState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakOutcome {
    /// First recorded login.
    Started,
    /// Login on the day after the previous one.
    Extended,
    /// Another login on the same day as the previous one.
    Unchanged,
    /// Gap of two or more days; the count restarts at 1.
    Reset,
}

/// Compute the state to store after a successful login on `today`.
pub fn advance(prev: StreakState, today: NaiveDate) -> (StreakState, StreakOutcome) {
    let Some(last) = prev.last_login else {
        return (StreakState { streak: 1, last_login: Some(today) }, StreakOutcome::Started);
    };
    let (streak, outcome) = match (today - last).num_days().abs() {
        0 => (prev.streak, StreakOutcome::Unchanged),
        1 => (prev.streak.saturating_add(1), StreakOutcome::Extended),
        _ => (1, StreakOutcome::Reset),
    };
    (StreakState { streak, last_login: Some(today) }, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, d).unwrap() }
    fn state(streak: i32, last: Option<NaiveDate>) -> StreakState { StreakState { streak, last_login: last } }

    #[test]
    fn first_login_starts_at_one() {
        let (next, outcome) = advance(state(0, None), day(10));
        assert_eq!(next, state(1, Some(day(10))));
        assert_eq!(outcome, StreakOutcome::Started);
    }

    #[test]
    fn consecutive_days_increment_by_one() {
        let mut s = state(0, None);
        for (i, d) in (10..15).enumerate() {
            s = advance(s, day(d)).0;
            assert_eq!(s.streak, i as i32 + 1);
        }
    }

    #[test]
    fn same_day_repeat_is_unchanged() {
        let (next, outcome) = advance(state(4, Some(day(10))), day(10));
        assert_eq!(next, state(4, Some(day(10))));
        assert_eq!(outcome, StreakOutcome::Unchanged);
    }

    #[test]
    fn gap_of_two_or_more_resets() {
        assert_eq!(advance(state(9, Some(day(10))), day(12)), (state(1, Some(day(12))), StreakOutcome::Reset));
        assert_eq!(advance(state(9, Some(day(1))), day(30)).0.streak, 1);
    }

    #[test]
    fn crosses_month_boundary() {
        let feb29 = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(advance(state(3, Some(feb29)), day(1)).0.streak, 4);
    }

    #[test]
    fn difference_is_absolute() {
        // stored date one day ahead of the login clock still counts as adjacent
        assert_eq!(advance(state(2, Some(day(11))), day(10)).1, StreakOutcome::Extended);
    }
}
