// src/filter.rs

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::process::{EffectiveDate, RateTable};
use crate::store::Session;

/// Billing codes relevant to the organisation. Loaded once per run.
#[derive(Debug, Default, Clone)]
pub struct ReferenceCodeSet(HashSet<String>);

impl ReferenceCodeSet {
    pub fn load<S: Session + ?Sized>(session: &mut S, sql: &str) -> Result<Self> {
        let codes: Self = session
            .query_column(sql)
            .context("querying reference codes")?
            .into_iter()
            .collect();
        if codes.is_empty() {
            warn!("reference code set is empty, no rows will be staged");
        } else {
            info!(count = codes.len(), "reference codes");
        }
        Ok(codes)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for ReferenceCodeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        )
    }
}

/// A row bound for staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredRow {
    pub code: String,
    pub rate_value: String,
    pub effective_date: EffectiveDate,
    pub load_timestamp: NaiveDateTime,
}

impl FilteredRow {
    /// Staging columns in order, all as text.
    pub fn to_params(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            self.rate_value.clone(),
            self.effective_date.to_string(),
            self.load_timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        ]
    }
}

/// Keep rows whose code is a reference code, stamped with the table's
/// effective date and one `load_timestamp` for the whole batch.
pub fn filter_rows(
    table: &RateTable,
    codes: &ReferenceCodeSet,
    load_timestamp: NaiveDateTime,
) -> Vec<FilteredRow> {
    let rows: Vec<FilteredRow> = table
        .rows
        .iter()
        .filter(|r| codes.contains(&r.code))
        .map(|r| FilteredRow {
            code: r.code.clone(),
            rate_value: r.rate_value.clone(),
            effective_date: table.effective_date,
            load_timestamp,
        })
        .collect();

    if rows.is_empty() {
        warn!(member = %table.member_name, "no extracted code is a reference code");
    }
    info!(
        member = %table.member_name,
        extracted = table.rows.len(),
        kept = rows.len(),
        "filtered against reference codes"
    );
    rows
}

/// `filter_rows` with the wall clock read once, now.
pub fn filter_now(table: &RateTable, codes: &ReferenceCodeSet) -> Vec<FilteredRow> {
    filter_rows(table, codes, Local::now().naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RateRow;
    use chrono::NaiveDate;

    fn table(rows: &[(&str, &str)]) -> RateTable {
        RateTable {
            member_name: "PPRRVU19_JAN.csv".into(),
            effective_date: EffectiveDate::new(2019, 1).unwrap(),
            rows: rows
                .iter()
                .map(|(c, r)| RateRow {
                    code: c.to_string(),
                    rate_value: r.to_string(),
                })
                .collect(),
        }
    }

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_micro_opt(14, 7, 9, 42)
            .unwrap()
    }

    #[test]
    fn keeps_only_reference_codes() {
        let codes: ReferenceCodeSet = ["99283", "99284"].iter().map(|s| s.to_string()).collect();
        let out = filter_rows(&table(&[("99283", "5.2"), ("99999", "1.0")]), &codes, ts());

        assert_eq!(
            out,
            vec![FilteredRow {
                code: "99283".into(),
                rate_value: "5.2".into(),
                effective_date: EffectiveDate::new(2019, 1).unwrap(),
                load_timestamp: ts(),
            }]
        );
    }

    #[test]
    fn zero_matches_is_not_an_error() {
        let codes: ReferenceCodeSet = vec!["G0101".to_string()].into_iter().collect();
        assert!(filter_rows(&table(&[("99283", "5.2")]), &codes, ts()).is_empty());
    }

    #[test]
    fn batch_shares_one_timestamp() {
        let codes: ReferenceCodeSet = ["99283", "99284"].iter().map(|s| s.to_string()).collect();
        let out = filter_now(&table(&[("99283", "5.2"), ("99284", "6.1")]), &codes);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].load_timestamp, out[1].load_timestamp);
    }

    #[test]
    fn params_are_text() {
        let row = FilteredRow {
            code: "99283".into(),
            rate_value: "5.2".into(),
            effective_date: EffectiveDate::new(2019, 1).unwrap(),
            load_timestamp: ts(),
        };
        assert_eq!(
            row.to_params(),
            vec![
                "99283",
                "5.2",
                "2019-01-01 00:00:00.000000",
                "2024-03-05 14:07:09.000042"
            ]
        );
    }

    #[test]
    fn reference_codes_are_trimmed() {
        let codes: ReferenceCodeSet = vec![" 99283 ".to_string(), "".to_string()]
            .into_iter()
            .collect();
        assert!(codes.contains("99283"));
        assert_eq!(codes.len(), 1);
    }
}
