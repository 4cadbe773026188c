use crate::error::AlignmentMiss;
use crate::models::{round2, FundamentalRecord, PriceBar};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// A fundamental record joined to the trading day it was matched to.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRecord {
    pub record: FundamentalRecord,
    pub price_date: NaiveDate,
    /// Close on `price_date`, rounded to cents.
    pub price: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Alignment {
    pub rows: Vec<AlignedRecord>,
    pub misses: Vec<AlignmentMiss>,
}

/// Maps report dates onto trading dates by walking backwards one calendar
/// day at a time.
#[derive(Debug, Clone, Copy)]
pub struct DateAligner {
    max_attempts: u32,
}

impl Default for DateAligner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl DateAligner {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Latest key of `series` in `[target - max_attempts days, target]`.
    pub fn find_closest_date<V>(
        &self,
        series: &BTreeMap<NaiveDate, V>,
        target: NaiveDate,
    ) -> Result<NaiveDate, AlignmentMiss> {
        let miss = AlignmentMiss {
            report_date: target,
            max_attempts: self.max_attempts,
        };
        let earliest = target
            .checked_sub_signed(Duration::days(i64::from(self.max_attempts)))
            .ok_or(miss)?;
        series
            .range(earliest..=target)
            .next_back()
            .map(|(date, _)| *date)
            .ok_or(miss)
    }

    /// Aligns every record to `bars` and returns the matched rows ordered by
    /// report date. Records without a match are reported as misses.
    pub fn align(&self, records: Vec<FundamentalRecord>, bars: &[PriceBar]) -> Alignment {
        let closes: BTreeMap<NaiveDate, f64> = bars.iter().map(|bar| (bar.date, bar.close)).collect();
        let mut alignment = Alignment::default();
        for record in records {
            match self.find_closest_date(&closes, record.report_date) {
                Ok(price_date) => {
                    let price = round2(closes[&price_date]);
                    alignment.rows.push(AlignedRecord {
                        record,
                        price_date,
                        price,
                    });
                }
                Err(miss) => alignment.misses.push(miss),
            }
        }
        alignment
            .rows
            .sort_by(|a, b| a.record.report_date.cmp(&b.record.report_date));
        alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series(dates: &[NaiveDate]) -> BTreeMap<NaiveDate, f64> {
        dates.iter().map(|d| (*d, 1.0)).collect()
    }

    #[test]
    fn exact_match_is_preferred() {
        let aligner = DateAligner::default();
        let data = series(&[date(2020, 3, 27), date(2020, 3, 31)]);
        assert_eq!(
            aligner.find_closest_date(&data, date(2020, 3, 31)),
            Ok(date(2020, 3, 31))
        );
    }

    #[test]
    fn walks_back_to_previous_trading_day_but_never_forward() {
        let aligner = DateAligner::default();
        let data = series(&[date(2020, 3, 27), date(2020, 4, 1)]);
        assert_eq!(
            aligner.find_closest_date(&data, date(2020, 3, 29)),
            Ok(date(2020, 3, 27))
        );
    }

    #[test]
    fn window_is_bounded_by_max_attempts() {
        let aligner = DateAligner::new(10);
        let data = series(&[date(2020, 3, 1)]);
        assert!(aligner.find_closest_date(&data, date(2020, 3, 11)).is_ok());
        let miss = aligner
            .find_closest_date(&data, date(2020, 3, 12))
            .unwrap_err();
        assert_eq!(miss.report_date, date(2020, 3, 12));
    }

    #[test]
    fn align_rounds_price_and_reports_misses() {
        let aligner = DateAligner::default();
        let bars = vec![PriceBar::new(date(2020, 3, 30), 1.0, 1.0, 1.0, 10.126, 5.0)];
        let records = vec![
            FundamentalRecord::new("AAA", date(2020, 3, 31)),
            FundamentalRecord::new("AAA", date(2019, 12, 31)),
        ];
        let alignment = aligner.align(records, &bars);
        assert_eq!(alignment.rows.len(), 1);
        assert_eq!(alignment.rows[0].price, 10.13);
        assert_eq!(alignment.rows[0].price_date, date(2020, 3, 30));
        assert_eq!(alignment.misses.len(), 1);
    }
}
