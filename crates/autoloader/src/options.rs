//! Load windows.
//!
//! A load request names either an explicit `[start, end)` range of
//! `YYYY/MM/DD` dates or a rolling period anchored on the current UTC date.

use chrono::{Months, NaiveDate};
use serde::Deserialize;
use snafu::prelude::*;
use std::fmt;
use std::str::FromStr;

use crate::discovery::DATE_FORMAT;
use crate::error::{InvalidDateSnafu, InvalidPeriodSnafu, OptionsError};

/// Start of the "everything" windows; sorts before any real date.
pub const EPOCH: &str = "0000/00/00";

/// Named load window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    /// Yesterday and today.
    Day,
    /// The month before yesterday.
    Month,
    /// Everything older than a month.
    Annual,
    /// Complete history.
    Everything,
    /// Nothing, except for tables created during the pass.
    New,
    /// Explicit range.
    Custom,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Month => "month",
            Period::Annual => "annual",
            Period::Everything => "everything",
            Period::New => "new",
            Period::Custom => "custom",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" | "daily" => Ok(Period::Day),
            "month" | "monthly" => Ok(Period::Month),
            "annual" | "annually" => Ok(Period::Annual),
            "all" | "everything" => Ok(Period::Everything),
            "new" => Ok(Period::New),
            _ => InvalidPeriodSnafu { period: s }.fail(),
        }
    }
}

/// Raw request parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub period: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// A resolved `[start, end)` window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Inclusive, `YYYY/MM/DD`.
    pub start: String,
    /// Exclusive, `YYYY/MM/DD`.
    pub end: String,
    pub period: Period,
    today: NaiveDate,
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn validate_date(value: &str) -> Result<(), OptionsError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .context(InvalidDateSnafu { value })?;
    Ok(())
}

impl LoadOptions {
    /// Window of a named period anchored on `today`.
    pub fn for_period(period: Period, today: NaiveDate) -> Result<Self, OptionsError> {
        let tomorrow = format_date(today + chrono::Days::new(1));
        let yesterday = format_date(today - chrono::Days::new(1));
        let month_ago = format_date(
            today
                .checked_sub_months(Months::new(1))
                .unwrap_or(NaiveDate::MIN),
        );

        let (start, end) = match period {
            Period::Day => (yesterday, tomorrow),
            Period::Month => (month_ago, yesterday),
            Period::Annual => (EPOCH.to_string(), month_ago),
            Period::Everything => (EPOCH.to_string(), tomorrow),
            Period::New => (tomorrow.clone(), tomorrow),
            Period::Custom => {
                return InvalidPeriodSnafu {
                    period: period.as_str(),
                }
                .fail();
            }
        };

        Ok(Self {
            start,
            end,
            period,
            today,
        })
    }

    /// Explicit `[start, end)` window.
    pub fn custom(start: &str, end: &str, today: NaiveDate) -> Result<Self, OptionsError> {
        validate_date(start)?;
        validate_date(end)?;
        Ok(Self {
            start: start.to_string(),
            end: end.to_string(),
            period: Period::Custom,
            today,
        })
    }

    /// Resolve request parameters. A full `start`/`end` pair wins over `period`.
    pub fn from_params(params: &LoadParams, today: NaiveDate) -> Result<Self, OptionsError> {
        if let (Some(start), Some(end)) = (non_empty(&params.start), non_empty(&params.end)) {
            return Self::custom(start, end, today);
        }

        let period: Period = params.period.as_deref().unwrap_or_default().parse()?;
        Self::for_period(period, today)
    }

    /// The complete-history window on the same anchor date.
    pub fn everything(&self) -> Self {
        Self {
            start: EPOCH.to_string(),
            end: format_date(self.today + chrono::Days::new(1)),
            period: Period::Everything,
            today: self.today,
        }
    }
}
