//! Unix cron expressions evaluated in UTC at minute granularity.

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result};

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A parsed 5-field cron expression (`minute hour day-of-month month day-of-week`).
///
/// The `cron` crate wants a seconds field and numbers weekdays from 1, so the
/// expression is rewritten before handing it over: seconds are pinned to 0 and
/// weekdays are spelled out by name. When both day-of-month and day-of-week are
/// restricted, unix cron fires when *either* matches; that case is held as two
/// schedules and the earlier candidate wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CronRepr", into = "CronRepr")]
pub struct Schedule {
    expr: String,
    variants: Vec<cron::Schedule>,
}

/// Wire form: `{ "cron": "* * * * *" }`.
#[derive(Serialize, Deserialize)]
struct CronRepr {
    cron: String,
}

impl Schedule {
    /// Parse a 5-field unix cron expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let &[minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(Error::schedule_parse(
                expr,
                format!(
                    "expected 5 fields (minute hour day-of-month month day-of-week), got {}",
                    fields.len()
                ),
            ));
        };

        let weekdays = spell_weekdays(dow).map_err(|reason| Error::schedule_parse(expr, reason))?;

        let mut candidates = Vec::with_capacity(2);
        if !dom.starts_with('*') && !dow.starts_with('*') {
            candidates.push(format!("0 {minute} {hour} {dom} {month} *"));
            candidates.push(format!("0 {minute} {hour} * {month} {weekdays}"));
        } else {
            candidates.push(format!("0 {minute} {hour} {dom} {month} {weekdays}"));
        }

        let variants = candidates
            .iter()
            .map(|c| {
                cron::Schedule::from_str(c).map_err(|e| Error::schedule_parse(expr, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let schedule = Self {
            expr: fields.join(" "),
            variants,
        };
        if schedule.next_fire_time(DateTime::UNIX_EPOCH).is_none() {
            return Err(Error::schedule_parse(expr, "expression never fires"));
        }
        Ok(schedule)
    }

    /// The normalized expression (fields separated by single spaces).
    #[must_use]
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire instant strictly after `after`.
    ///
    /// Returns `None` only once the underlying calendar is exhausted (the
    /// `cron` crate stops at year 2100).
    #[must_use]
    pub fn next_fire_time(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.variants
            .iter()
            .filter_map(|s| s.after(&after).next())
            .min()
    }
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl Eq for Schedule {}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<CronRepr> for Schedule {
    type Error = Error;

    fn try_from(repr: CronRepr) -> Result<Self> {
        Self::parse(&repr.cron)
    }
}

impl From<Schedule> for CronRepr {
    fn from(schedule: Schedule) -> Self {
        Self {
            cron: schedule.expr,
        }
    }
}

/// Rewrite a unix day-of-week field (0-7, 0 and 7 = Sunday, names allowed)
/// as a list of weekday names.
fn spell_weekdays(field: &str) -> std::result::Result<String, String> {
    if field == "*" {
        return Ok(field.to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: usize = step
                    .parse()
                    .map_err(|_| format!("invalid day-of-week step '{step}'"))?;
                (base, step)
            },
            None => (item, 1),
        };
        if step == 0 {
            return Err("day-of-week step must be > 0".into());
        }

        let (start, end) = if base == "*" {
            (0, 6)
        } else if let Some((lo, hi)) = base.split_once('-') {
            (weekday_ordinal(lo)?, weekday_ordinal(hi)?)
        } else {
            let day = weekday_ordinal(base)?;
            (day, if step > 1 { 6 } else { day })
        };
        if start > end {
            return Err(format!("day-of-week range '{base}' is reversed"));
        }

        for day in (start..=end).step_by(step) {
            days[day % 7] = true;
        }
    }

    Ok(WEEKDAYS
        .iter()
        .zip(days)
        .filter_map(|(name, on)| on.then_some(*name))
        .collect::<Vec<_>>()
        .join(","))
}

fn weekday_ordinal(token: &str) -> std::result::Result<usize, String> {
    if let Ok(n) = token.parse::<usize>() {
        return if n <= 7 {
            Ok(n)
        } else {
            Err(format!("day-of-week value {n} out of range 0-7"))
        };
    }
    WEEKDAYS
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .ok_or_else(|| format!("unknown day-of-week '{token}'"))
}
