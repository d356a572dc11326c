use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// United States federal business calendar: weekdays minus federal holidays,
/// with weekend holidays shifted to their observed day.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusinessCalendar;

impl BusinessCalendar {
    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
            && !federal_holidays(date.year()).contains(&date)
    }

    /// Rolls backward to the nearest business day, staying put when the date
    /// already is one.
    pub fn rollback_to_business_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date;
        while !self.is_business_day(day) {
            day = match day.pred_opt() {
                Some(previous) => previous,
                None => return day,
            };
        }
        day
    }

    pub fn previous_business_day(&self, date: NaiveDate) -> NaiveDate {
        match date.pred_opt() {
            Some(previous) => self.rollback_to_business_day(previous),
            None => date,
        }
    }

    pub fn next_business_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date;
        loop {
            day = match day.succ_opt() {
                Some(next) => next,
                None => return day,
            };
            if self.is_business_day(day) {
                return day;
            }
        }
    }

    pub fn plus_business_days(&self, date: NaiveDate, days: u64) -> NaiveDate {
        let mut day = date;
        for _ in 0..days {
            day = self.next_business_day(day);
        }
        day
    }
}

/// Observed federal holidays falling inside the given calendar year.
///
/// Fixed-date holidays landing on a Saturday are observed the Friday before,
/// on a Sunday the Monday after. New Year's Day of the following year can
/// therefore be observed on December 31 and is folded into this year's set.
pub fn federal_holidays(year: i32) -> BTreeSet<NaiveDate> {
    let mut days = BTreeSet::new();
    let mut add = |date: Option<NaiveDate>| {
        if let Some(observed) = date.map(observed_date) {
            if observed.year() == year {
                days.insert(observed);
            }
        }
    };

    add(NaiveDate::from_ymd_opt(year, 1, 1));
    add(NaiveDate::from_ymd_opt(year + 1, 1, 1));
    add(NaiveDate::from_weekday_of_month_opt(year, 1, Weekday::Mon, 3));
    add(NaiveDate::from_weekday_of_month_opt(year, 2, Weekday::Mon, 3));
    add(last_weekday_of_month(year, 5, Weekday::Mon));
    add(NaiveDate::from_ymd_opt(year, 6, 19));
    add(NaiveDate::from_ymd_opt(year, 7, 4));
    add(NaiveDate::from_weekday_of_month_opt(year, 9, Weekday::Mon, 1));
    add(NaiveDate::from_weekday_of_month_opt(year, 10, Weekday::Mon, 2));
    add(NaiveDate::from_ymd_opt(year, 11, 11));
    add(NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Thu, 4));
    add(NaiveDate::from_ymd_opt(year, 12, 25));

    days
}

/// Weekday-anchored holidays pass through unchanged.
fn observed_date(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date.pred_opt().unwrap_or(date),
        Weekday::Sun => date.succ_opt().unwrap_or(date),
        _ => date,
    }
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, 5)
        .or_else(|| NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn weekends_are_not_business_days() {
        let calendar = BusinessCalendar;
        assert!(!calendar.is_business_day(day(2018, 3, 10)));
        assert!(!calendar.is_business_day(day(2018, 3, 11)));
        assert!(calendar.is_business_day(day(2018, 3, 12)));
    }

    #[test]
    fn saturday_holidays_are_observed_the_friday_before() {
        // July 4 2026 is a Saturday.
        let holidays = federal_holidays(2026);
        assert!(holidays.contains(&day(2026, 7, 3)));
        assert!(!holidays.contains(&day(2026, 7, 4)));

        let calendar = BusinessCalendar;
        assert!(!calendar.is_business_day(day(2026, 7, 3)));
        assert!(calendar.is_business_day(day(2026, 7, 6)));
    }

    #[test]
    fn new_years_observance_can_cross_the_year_boundary() {
        // January 1 2022 is a Saturday, observed December 31 2021.
        assert!(federal_holidays(2021).contains(&day(2021, 12, 31)));

        let observances_2022 = federal_holidays(2022);
        assert!(!observances_2022.contains(&day(2022, 1, 1)));
        assert!(!observances_2022.iter().any(|date| date.month() == 1 && date.day() <= 2));
    }

    #[test]
    fn floating_holidays_follow_their_weekday_rule() {
        let holidays = federal_holidays(2018);
        assert!(holidays.contains(&day(2018, 11, 22)), "fourth Thursday of November");
        assert!(holidays.contains(&day(2018, 5, 28)), "last Monday of May");
        assert!(holidays.contains(&day(2018, 1, 15)), "third Monday of January");
    }

    #[test]
    fn juneteenth_is_part_of_the_calendar() {
        // June 19 2021 is a Saturday, observed June 18.
        assert!(federal_holidays(2021).contains(&day(2021, 6, 18)));
        assert!(federal_holidays(2023).contains(&day(2023, 6, 19)));
    }

    #[test]
    fn business_day_walks_skip_weekends_and_holidays() {
        let calendar = BusinessCalendar;

        // Wednesday before Thanksgiving 2018.
        let start = day(2018, 11, 21);
        assert_eq!(calendar.plus_business_days(start, 1), day(2018, 11, 23));
        assert_eq!(calendar.plus_business_days(start, 2), day(2018, 11, 26));
        assert_eq!(calendar.plus_business_days(start, 0), start);

        assert_eq!(calendar.previous_business_day(day(2018, 11, 23)), start);
        assert_eq!(calendar.previous_business_day(day(2018, 11, 26)), day(2018, 11, 23));
    }

    #[test]
    fn rollback_only_moves_off_non_business_days() {
        let calendar = BusinessCalendar;
        assert_eq!(calendar.rollback_to_business_day(day(2018, 3, 11)), day(2018, 3, 9));
        assert_eq!(calendar.rollback_to_business_day(day(2018, 3, 12)), day(2018, 3, 12));
    }
}
