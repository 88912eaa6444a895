//! Planting-date helpers

use chrono::NaiveDate;

/// Lower median of a set of dates (always one of the inputs)
///
/// Returns `None` for an empty input.
pub fn median_date<I>(dates: I) -> Option<NaiveDate>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut sorted: Vec<NaiveDate> = dates.into_iter().collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_unstable();
    Some(sorted[(sorted.len() - 1) / 2])
}

/// Absolute difference in whole days
pub fn day_gap(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

/// Earliest and latest date
pub fn date_span<I>(dates: I) -> Option<(NaiveDate, NaiveDate)>
where
    I: IntoIterator<Item = NaiveDate>,
{
    dates.into_iter().fold(None, |span, d| match span {
        None => Some((d, d)),
        Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median_date(vec![d(5), d(1), d(3)]), Some(d(3)));
        // Even count: lower of the two middle dates
        assert_eq!(median_date(vec![d(1), d(1), d(9), d(9)]), Some(d(1)));
        assert_eq!(median_date(Vec::<NaiveDate>::new()), None);
    }

    #[test]
    fn test_day_gap_and_span() {
        assert_eq!(day_gap(d(2), d(10)), 8);
        assert_eq!(day_gap(d(10), d(2)), 8);
        assert_eq!(date_span(vec![d(4), d(2), d(7)]), Some((d(2), d(7))));
        assert_eq!(date_span(Vec::<NaiveDate>::new()), None);
    }
}
