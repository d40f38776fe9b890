//! Month grids, month navigation and recurrence rules.

use chrono::{Datelike, Duration, Locale, NaiveDate, Weekday};

pub const REPETITION_TYPE_WEEKLY: &str = "w";
pub const REPETITION_TYPE_MONTHLY: &str = "m";
pub const REPETITION_SUBTYPE_WEEK_DAY: &str = "w";
pub const REPETITION_SUBTYPE_MONTH_DAY: &str = "m";

/// How a recurring task repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Every week on the given weekday
    Weekly { weekday: Weekday },
    /// First given weekday of every month
    MonthlyWeekDay { weekday: Weekday },
    /// Given day of every month, clamped to the month's last day
    MonthlyDay { day: u32 },
}

impl Recurrence {
    /// Build a rule from its stored `(type, subtype, value)` triple.
    pub fn from_parts(kind: &str, subtype: Option<&str>, value: i64) -> Option<Self> {
        match (kind, subtype) {
            (REPETITION_TYPE_WEEKLY, _) => weekday_from_value(value).map(|weekday| Self::Weekly { weekday }),
            (REPETITION_TYPE_MONTHLY, Some(REPETITION_SUBTYPE_WEEK_DAY)) => {
                weekday_from_value(value).map(|weekday| Self::MonthlyWeekDay { weekday })
            },
            (REPETITION_TYPE_MONTHLY, Some(REPETITION_SUBTYPE_MONTH_DAY)) => {
                u32::try_from(value)
                    .ok()
                    .filter(|d| (1..=31).contains(d))
                    .map(|day| Self::MonthlyDay { day })
            },
            _ => None,
        }
    }

    /// The `(type, subtype, value)` triple stored in the database.
    pub fn to_parts(self) -> (&'static str, Option<&'static str>, i64) {
        match self {
            Self::Weekly { weekday } => (
                REPETITION_TYPE_WEEKLY,
                Some(REPETITION_SUBTYPE_WEEK_DAY),
                i64::from(weekday.num_days_from_monday()),
            ),
            Self::MonthlyWeekDay { weekday } => (
                REPETITION_TYPE_MONTHLY,
                Some(REPETITION_SUBTYPE_WEEK_DAY),
                i64::from(weekday.num_days_from_monday()),
            ),
            Self::MonthlyDay { day } => (
                REPETITION_TYPE_MONTHLY,
                Some(REPETITION_SUBTYPE_MONTH_DAY),
                i64::from(day),
            ),
        }
    }

    /// Days of `year`/`month` on which this rule fires, ascending.
    pub fn days_in(self, year: i32, month: u32) -> Vec<u32> {
        let Some(last) = days_in_month(year, month) else {
            return Vec::new();
        };

        match self {
            Self::Weekly { weekday } => (1..=last)
                .filter(|&d| weekday_of(year, month, d) == Some(weekday))
                .collect(),
            Self::MonthlyWeekDay { weekday } => (1..=7)
                .find(|&d| weekday_of(year, month, d) == Some(weekday))
                .into_iter()
                .collect(),
            Self::MonthlyDay { day } => vec![day.min(last)],
        }
    }
}

/// 0 = Monday .. 6 = Sunday. Out-of-range values wrap.
pub fn weekday_from_index(index: u8) -> Weekday {
    let mut weekday = Weekday::Mon;
    for _ in 0..(index % 7) {
        weekday = weekday.succ();
    }
    weekday
}

fn weekday_from_value(value: i64) -> Option<Weekday> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 6)
        .map(weekday_from_index)
}

fn weekday_of(year: i32, month: u32, day: u32) -> Option<Weekday> {
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.weekday())
}

/// Number of days in a month, `None` for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = next_month(year, month);
    let next_first = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
    u32::try_from((next_first - first).num_days()).ok()
}

pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// The month laid out as complete weeks, padded with days of the
/// neighbouring months so every row has seven dates.
pub fn month_weeks(year: i32, month: u32, week_start: Weekday) -> Vec<Vec<NaiveDate>> {
    let (Some(first), Some(last_day)) = (
        NaiveDate::from_ymd_opt(year, month, 1),
        days_in_month(year, month),
    ) else {
        return Vec::new();
    };
    let Some(last) = NaiveDate::from_ymd_opt(year, month, last_day) else {
        return Vec::new();
    };

    let lead = days_between(week_start, first.weekday());
    let mut cursor = first - Duration::days(lead);

    let mut weeks = Vec::new();
    while cursor <= last {
        let week: Vec<NaiveDate> = (0..7).map(|i| cursor + Duration::days(i)).collect();
        cursor += Duration::days(7);
        weeks.push(week);
    }
    weeks
}

/// Column headers for a week starting at `week_start`.
pub fn weekday_names(week_start: Weekday, locale: Locale) -> Vec<String> {
    // 2024-01-01 is a Monday
    let Some(monday) = NaiveDate::from_ymd_opt(2024, 1, 1) else {
        return Vec::new();
    };
    let offset = i64::from(week_start.num_days_from_monday());
    (0..7)
        .map(|i| {
            (monday + Duration::days(offset + i))
                .format_localized("%a", locale)
                .to_string()
        })
        .collect()
}

pub fn month_name(year: i32, month: u32, locale: Locale) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.format_localized("%B", locale).to_string())
        .unwrap_or_default()
}

fn days_between(from: Weekday, to: Weekday) -> i64 {
    let from = i64::from(from.num_days_from_monday());
    let to = i64::from(to.num_days_from_monday());
    (to - from).rem_euclid(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2024, 12), Some(31));
        assert_eq!(days_in_month(2024, 13), None);
    }

    #[test]
    fn test_month_navigation_wraps_year() {
        assert_eq!(previous_month(2024, 1), (2023, 12));
        assert_eq!(next_month(2024, 12), (2025, 1));
        assert_eq!(next_month(2024, 5), (2024, 6));
    }

    #[test]
    fn test_month_weeks_monday_start() {
        // October 2026 starts on a Thursday and ends on a Saturday
        let weeks = month_weeks(2026, 10, Weekday::Mon);
        assert_eq!(weeks.len(), 5);
        assert_eq!(weeks[0][0], NaiveDate::from_ymd_opt(2026, 9, 28).unwrap());
        assert_eq!(weeks[0][3], NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert_eq!(weeks[4][6], NaiveDate::from_ymd_opt(2026, 11, 1).unwrap());
        assert!(weeks.iter().all(|w| w.len() == 7));
    }

    #[test]
    fn test_month_weeks_sunday_start() {
        let weeks = month_weeks(2026, 10, Weekday::Sun);
        assert_eq!(weeks[0][0], NaiveDate::from_ymd_opt(2026, 9, 27).unwrap());
        assert_eq!(weeks[0][0].weekday(), Weekday::Sun);
        assert_eq!(weeks.last().unwrap()[6], NaiveDate::from_ymd_opt(2026, 10, 31).unwrap());
    }

    #[test]
    fn test_weekly_recurrence() {
        let rule = Recurrence::Weekly {
            weekday: Weekday::Fri,
        };
        assert_eq!(rule.days_in(2026, 10), vec![2, 9, 16, 23, 30]);
    }

    #[test]
    fn test_monthly_week_day_recurrence() {
        let rule = Recurrence::MonthlyWeekDay {
            weekday: Weekday::Mon,
        };
        assert_eq!(rule.days_in(2026, 10), vec![5]);
        assert_eq!(rule.days_in(2026, 6), vec![1]);
    }

    #[test]
    fn test_monthly_day_clamps_to_month_end() {
        let rule = Recurrence::MonthlyDay { day: 31 };
        assert_eq!(rule.days_in(2026, 10), vec![31]);
        assert_eq!(rule.days_in(2026, 2), vec![28]);
    }

    #[test]
    fn test_recurrence_parts() {
        assert_eq!(
            Recurrence::from_parts("w", Some("w"), 2),
            Some(Recurrence::Weekly {
                weekday: Weekday::Wed
            })
        );
        assert_eq!(
            Recurrence::from_parts("m", Some("m"), 15),
            Some(Recurrence::MonthlyDay { day: 15 })
        );
        assert_eq!(Recurrence::from_parts("m", Some("m"), 0), None);
        assert_eq!(Recurrence::from_parts("w", None, 9), None);
        assert_eq!(Recurrence::from_parts("x", None, 1), None);

        let rule = Recurrence::MonthlyWeekDay {
            weekday: Weekday::Sun,
        };
        let (kind, subtype, value) = rule.to_parts();
        assert_eq!(Recurrence::from_parts(kind, subtype, value), Some(rule));
    }

    #[test]
    fn test_weekday_from_index() {
        assert_eq!(weekday_from_index(0), Weekday::Mon);
        assert_eq!(weekday_from_index(6), Weekday::Sun);
        assert_eq!(weekday_from_index(7), Weekday::Mon);
    }

    #[test]
    fn test_localized_names() {
        assert_eq!(month_name(2026, 10, Locale::en_US), "October");
        assert_eq!(month_name(2026, 10, Locale::es_ES), "octubre");
        let names = weekday_names(Weekday::Sun, Locale::en_US);
        assert_eq!(names.first().map(String::as_str), Some("Sun"));
        assert_eq!(names.len(), 7);
    }
}
