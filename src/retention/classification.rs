use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, Utc, Weekday};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reserved pointer name written next to the classified artifacts.
pub const LATEST_POINTER: &str = "file.dump";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Daily,
    Weekly,
    Monthly,
    Manual,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Daily,
        Classification::Weekly,
        Classification::Monthly,
        Classification::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Daily => "daily",
            Classification::Weekly => "weekly",
            Classification::Monthly => "monthly",
            Classification::Manual => "manual",
        }
    }

    pub fn max_age(&self) -> Duration {
        match self {
            Classification::Daily => Duration::days(7),
            Classification::Weekly => Duration::days(30),
            Classification::Monthly | Classification::Manual => Duration::days(365),
        }
    }

    /// Class of a dump taken by the scheduler on `date`.
    pub fn for_scheduled_dump(date: NaiveDate) -> Self {
        if date.day() == 1 {
            Classification::Monthly
        } else if date.weekday() == Weekday::Sat {
            Classification::Weekly
        } else {
            Classification::Daily
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backup classification '{0}'")]
pub struct UnknownClassification(pub String);

impl FromStr for Classification {
    type Err = UnknownClassification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Classification::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownClassification(s.to_string()))
    }
}

/// `file_<class>_<RFC3339 UTC>.dump`
pub fn artifact_name(classification: Classification, timestamp: DateTime<Utc>) -> String {
    format!(
        "file_{}_{}.dump",
        classification,
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Classification token of an artifact name, if it has the `a_b_c...` shape.
pub fn parse_classification(name: &str) -> Option<&str> {
    let mut fields = name.split('_');
    let _head = fields.next()?;
    let class = fields.next()?;
    fields.next()?;
    Some(class)
}

/// Maps classification tokens to their maximum age.
pub struct RetentionRule;

impl RetentionRule {
    pub fn max_age(token: &str) -> Option<Duration> {
        token.parse::<Classification>().ok().map(|c| c.max_age())
    }
}
