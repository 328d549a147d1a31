use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::fmt;
use tracing::debug;

use crate::process::utils::first_number;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// First day of a release month, midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EffectiveDate {
    pub year: i32,
    pub month: u32,
}

impl EffectiveDate {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }
}

/// `YYYY-MM-01 00:00:00.000000`
impl fmt::Display for EffectiveDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-01 00:00:00.000000", self.year, self.month)
    }
}

/// Infer the release month of a rate file.
///
/// The year is the first number in `description`. The month comes from a full
/// month name in `description` when there is one, and only otherwise from the
/// file name, whose second `_`-separated segment must start with a month
/// abbreviation (`PPRRVU19_JAN.csv`).
pub fn infer_effective_date(description: &str, file_name: &str) -> Result<EffectiveDate> {
    let year_str = first_number(description)
        .with_context(|| format!("no year in description {:?}", description))?;
    let year: i32 = year_str
        .parse()
        .with_context(|| format!("year {:?} in description is not an integer", year_str))?;

    let month = match month_from_description(description) {
        Some(m) => m,
        None => {
            debug!(description, file_name, "no month name in description, using file name");
            month_from_file_name(file_name)?
        }
    };

    match EffectiveDate::new(year, month) {
        Some(date) => Ok(date),
        None => bail!("{}-{:02} is not a valid effective date", year, month),
    }
}

fn month_from_description(description: &str) -> Option<u32> {
    description.split_whitespace().find_map(|word| {
        let word = word.to_lowercase();
        MONTHS
            .iter()
            .position(|m| *m == word)
            .map(|i| i as u32 + 1)
    })
}

fn month_from_file_name(file_name: &str) -> Result<u32> {
    let segment = file_name.split('_').nth(1).with_context(|| {
        format!(
            "file name {:?} has no `_`-separated month segment",
            file_name
        )
    })?;
    let abbrev: String = segment.chars().take(3).collect::<String>().to_lowercase();
    MONTHS
        .iter()
        .position(|m| abbrev.len() == 3 && m.starts_with(&abbrev))
        .map(|i| i as u32 + 1)
        .with_context(|| {
            format!(
                "{:?} in file name {:?} is not a month abbreviation",
                abbrev, file_name
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn january_release() -> Result<()> {
        let d = infer_effective_date(
            "2019 National Physician Fee Schedule Relative Value File January Release",
            "PPRRVU19_JAN.csv",
        )?;
        assert_eq!(d, EffectiveDate { year: 2019, month: 1 });
        assert_eq!(d.to_string(), "2019-01-01 00:00:00.000000");
        Ok(())
    }

    #[test]
    fn description_month_wins_over_file_name() -> Result<()> {
        let d = infer_effective_date(
            "2020 National Physician Fee Schedule Relative Value File october release",
            "PPRRVU20_JUL.csv",
        )?;
        assert_eq!(d.to_string(), "2020-10-01 00:00:00.000000");
        Ok(())
    }

    #[test]
    fn falls_back_to_file_name() -> Result<()> {
        let d = infer_effective_date(
            "2021 National Physician Fee Schedule Relative Value File",
            "PPRRVU21_APR_updated.csv",
        )?;
        assert_eq!(d.to_string(), "2021-04-01 00:00:00.000000");
        Ok(())
    }

    #[test]
    fn unusable_file_name_is_an_error() {
        let desc = "2021 National Physician Fee Schedule Relative Value File";
        assert!(infer_effective_date(desc, "PPRRVU21.csv").is_err());
        assert!(infer_effective_date(desc, "PPRRVU21_XYZ.csv").is_err());
        assert!(infer_effective_date(desc, "PPRRVU21_MA.csv").is_err());
    }

    #[test]
    fn year_must_be_an_integer() {
        assert!(infer_effective_date("Release 2.5 January", "X_JAN.csv").is_err());
        assert!(infer_effective_date("January release", "X_JAN.csv").is_err());
    }

    #[test]
    fn effective_date_needs_a_real_month() {
        assert!(EffectiveDate::new(2019, 13).is_none());
        assert!(EffectiveDate::new(2019, 0).is_none());
        assert_eq!(
            EffectiveDate::new(2019, 7).map(|d| d.to_string()),
            Some("2019-07-01 00:00:00.000000".to_string())
        );
    }
}
