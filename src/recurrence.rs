//! Recurring follow-up tasks.
//!
//! A todo's `recurrence` column holds a JSON descriptor such as
//! `{"frequency": "monthly", "interval": 1, "until": "2026-12-31"}`. When the
//! todo is completed, [`Recurrence::next_due`] decides the due date of the
//! follow-up row, or that the series has ended.
//!
//! Month-based frequencies use calendar months and clamp to the last day of
//! the target month (Jan 31 + 1 month = Feb 28/29). Due dates are plain dates,
//! so no timezone conversion happens here.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CrmError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recurrence {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Last date (inclusive) an occurrence may fall on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<NaiveDate>,
}

fn default_interval() -> u32 {
    1
}

impl Recurrence {
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(CrmError::invalid("recurrence", "interval must be >= 1"));
        }
        Ok(())
    }

    /// Parse and validate a descriptor from its stored JSON form.
    pub fn from_json(raw: &str) -> Result<Self> {
        let rec: Recurrence = serde_json::from_str(raw)
            .map_err(|e| CrmError::invalid("recurrence", e.to_string()))?;
        rec.validate()?;
        Ok(rec)
    }

    pub fn to_json(&self) -> String {
        // A struct of enums, integers and dates always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Date one step after `from`, or `None` when the series is over.
    pub fn next_due(&self, from: NaiveDate) -> Option<NaiveDate> {
        let next = match self.frequency {
            Frequency::Daily => from.checked_add_days(Days::new(u64::from(self.interval))),
            Frequency::Weekly => from.checked_add_days(Days::new(7 * u64::from(self.interval))),
            Frequency::Monthly => from.checked_add_months(Months::new(self.interval)),
            Frequency::Quarterly => {
                from.checked_add_months(Months::new(self.interval.checked_mul(3)?))
            }
            Frequency::Yearly => from.checked_add_months(Months::new(self.interval.checked_mul(12)?)),
        }?;

        match self.until {
            Some(until) if next > until => None,
            _ => Some(next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rec(frequency: Frequency, interval: u32) -> Recurrence {
        Recurrence {
            frequency,
            interval,
            until: None,
        }
    }

    #[test]
    fn test_daily_and_weekly() {
        assert_eq!(
            rec(Frequency::Daily, 3).next_due(date(2026, 2, 27)),
            Some(date(2026, 3, 2))
        );
        assert_eq!(
            rec(Frequency::Weekly, 2).next_due(date(2026, 10, 18)),
            Some(date(2026, 11, 1))
        );
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        assert_eq!(
            rec(Frequency::Monthly, 1).next_due(date(2026, 1, 31)),
            Some(date(2026, 2, 28))
        );
        assert_eq!(
            rec(Frequency::Monthly, 1).next_due(date(2028, 1, 31)),
            Some(date(2028, 2, 29))
        );
        assert_eq!(
            rec(Frequency::Monthly, 1).next_due(date(2026, 3, 15)),
            Some(date(2026, 4, 15))
        );
    }

    #[test]
    fn test_quarterly_and_yearly() {
        assert_eq!(
            rec(Frequency::Quarterly, 1).next_due(date(2026, 11, 30)),
            Some(date(2027, 2, 28))
        );
        assert_eq!(
            rec(Frequency::Yearly, 1).next_due(date(2028, 2, 29)),
            Some(date(2029, 2, 28))
        );
    }

    #[test]
    fn test_until_is_inclusive() {
        let r = Recurrence {
            frequency: Frequency::Weekly,
            interval: 1,
            until: Some(date(2026, 10, 25)),
        };
        assert_eq!(r.next_due(date(2026, 10, 18)), Some(date(2026, 10, 25)));
        assert_eq!(r.next_due(date(2026, 10, 19)), None);
    }

    #[test]
    fn test_from_json_defaults_interval() {
        let r = Recurrence::from_json(r#"{"frequency": "monthly"}"#).unwrap();
        assert_eq!(r.interval, 1);
        assert_eq!(r.until, None);
    }

    #[test]
    fn test_from_json_rejects_zero_interval_and_unknown_frequency() {
        assert!(Recurrence::from_json(r#"{"frequency": "weekly", "interval": 0}"#).is_err());
        assert!(Recurrence::from_json(r#"{"frequency": "fortnightly"}"#).is_err());
        assert!(Recurrence::from_json("not json").is_err());
    }

    #[test]
    fn test_stored_form_parses_back() {
        let r = Recurrence {
            frequency: Frequency::Quarterly,
            interval: 2,
            until: Some(date(2027, 6, 30)),
        };
        assert_eq!(Recurrence::from_json(&r.to_json()).unwrap(), r);
    }
}
