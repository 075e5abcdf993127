use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde_json::{Map, Value};

use crate::errors::RestackError;
use crate::models::TriggerKind;

const WEEKDAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
const MONTH_NAMES: [&str; 12] = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Interval(Duration),
    Cron(CronSchedule),
}

/// A cron trigger in UTC. The keyword fields are expanded, then evaluated
/// as a six-field `cron` expression with seconds pinned to zero.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for CronSchedule {}

impl Trigger {
    pub fn parse(kind: TriggerKind, spec: &Value) -> Result<Self, RestackError> {
        let fields = spec
            .as_object()
            .ok_or_else(|| invalid(format!("{} trigger spec must be an object", kind.as_str())))?;
        match kind {
            TriggerKind::Interval => parse_interval(fields),
            TriggerKind::Cron => CronSchedule::parse(fields).map(Trigger::Cron),
        }
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Interval(every) => chrono::Duration::from_std(*every).ok().map(|d| after + d),
            Trigger::Cron(cron) => cron.next_after(after),
        }
    }
}

fn invalid(msg: String) -> RestackError {
    RestackError::Config(format!("Invalid trigger: {}", msg))
}

fn parse_interval(fields: &Map<String, Value>) -> Result<Trigger, RestackError> {
    let mut secs: u64 = 0;
    for (key, value) in fields {
        let unit = match key.as_str() {
            "weeks" => 7 * 24 * 3600,
            "days" => 24 * 3600,
            "hours" => 3600,
            "minutes" => 60,
            "seconds" => 1,
            other => return Err(invalid(format!("unknown interval field '{}'", other))),
        };
        let n = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .ok_or_else(|| invalid(format!("interval field '{}' must be a non-negative integer", key)))?;
        secs = n
            .checked_mul(unit)
            .and_then(|v| secs.checked_add(v))
            .ok_or_else(|| invalid("interval overflows".into()))?;
    }
    if secs == 0 {
        return Err(invalid("interval must be longer than zero".into()));
    }
    Ok(Trigger::Interval(Duration::from_secs(secs)))
}

struct Field {
    name: &'static str,
    min: u32,
    max: u32,
    /// Value used when a more significant field was given and this one was not.
    default: Option<u32>,
    names: &'static [&'static str],
    /// Offset added to a name's index, e.g. 1 for months.
    name_base: u32,
}

// Most significant first.
const FIELDS: [Field; 5] = [
    Field { name: "month", min: 1, max: 12, default: Some(1), names: &MONTH_NAMES, name_base: 1 },
    Field { name: "day", min: 1, max: 31, default: Some(1), names: &[], name_base: 0 },
    Field { name: "day_of_week", min: 0, max: 6, default: None, names: &WEEKDAY_NAMES, name_base: 0 },
    Field { name: "hour", min: 0, max: 23, default: Some(0), names: &[], name_base: 0 },
    Field { name: "minute", min: 0, max: 59, default: Some(0), names: &[], name_base: 0 },
];

impl CronSchedule {
    /// Fields above the least significant given one default to `*`; fields
    /// below it default to their minimum (`day_of_week` stays `*`).
    fn parse(spec: &Map<String, Value>) -> Result<Self, RestackError> {
        for key in spec.keys() {
            if !FIELDS.iter().any(|f| f.name == key) {
                return Err(invalid(format!("unknown cron field '{}'", key)));
            }
        }
        let least_significant = FIELDS.iter().rposition(|f| spec.contains_key(f.name));

        let mut rendered = Vec::with_capacity(FIELDS.len());
        for (i, field) in FIELDS.iter().enumerate() {
            let set = match spec.get(field.name) {
                Some(value) => {
                    let expr = match value {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        _ => return Err(invalid(format!("cron field '{}' must be a string or number", field.name))),
                    };
                    expand(field, &expr)?
                }
                None => match (least_significant, field.default) {
                    (Some(last), Some(default)) if i > last => BTreeSet::from([default]),
                    _ => (field.min..=field.max).collect(),
                },
            };
            rendered.push(render(field, &set));
        }

        // sec min hour day-of-month month day-of-week
        let [month, day, weekday, hour, minute]: [String; 5] =
            rendered.try_into().map_err(|_| invalid("cron fields out of order".into()))?;
        let expression = format!("0 {} {} {} {} {}", minute, hour, day, month, weekday);
        let schedule = Schedule::from_str(&expression).map_err(|e| invalid(format!("'{}': {}", expression, e)))?;
        Ok(Self { expression, schedule })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// A whole field collapses to `*`. Weekdays are written by name since the
/// `cron` crate counts them from Sunday.
fn render(field: &Field, set: &BTreeSet<u32>) -> String {
    if set.len() == (field.min..=field.max).count() {
        return "*".into();
    }
    let atoms: Vec<String> = set
        .iter()
        .map(|&v| match field.name {
            "day_of_week" => {
                let name = WEEKDAY_NAMES[v as usize];
                format!("{}{}", name[..1].to_ascii_uppercase(), &name[1..])
            }
            _ => v.to_string(),
        })
        .collect();
    atoms.join(",")
}

fn expand(field: &Field, expr: &str) -> Result<BTreeSet<u32>, RestackError> {
    let bad = |part: &str| invalid(format!("cron field '{}' has an invalid expression '{}'", field.name, part));
    let mut out = BTreeSet::new();

    for part in expr.split(',').map(str::trim) {
        if part.is_empty() {
            return Err(bad(expr));
        }
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.trim().parse().map_err(|_| bad(part))?;
                if step == 0 {
                    return Err(bad(part));
                }
                (range.trim(), step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range == "*" {
            (field.min, field.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (value(field, a).ok_or_else(|| bad(part))?, value(field, b).ok_or_else(|| bad(part))?)
        } else {
            let v = value(field, range).ok_or_else(|| bad(part))?;
            // `a/n` runs from `a` to the end of the field.
            (v, if part.contains('/') { field.max } else { v })
        };
        if lo > hi {
            return Err(bad(part));
        }
        out.extend((lo..=hi).step_by(step as usize));
    }
    Ok(out)
}

fn value(field: &Field, raw: &str) -> Option<u32> {
    let raw = raw.trim().to_ascii_lowercase();
    let v = match field.names.iter().position(|n| *n == raw) {
        Some(idx) => idx as u32 + field.name_base,
        None => raw.parse().ok()?,
    };
    (field.min..=field.max).contains(&v).then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn cron(spec: Value) -> Trigger {
        Trigger::parse(TriggerKind::Cron, &spec).unwrap()
    }

    #[test]
    fn test_interval_sums_units() {
        let t = Trigger::parse(TriggerKind::Interval, &json!({"hours": 1, "minutes": "30"})).unwrap();
        assert_eq!(t, Trigger::Interval(Duration::from_secs(5400)));
        assert_eq!(t.next_after(at(2024, 1, 1, 0, 0)), Some(at(2024, 1, 1, 1, 30)));
    }

    #[test]
    fn test_interval_rejects_zero_and_unknown_fields() {
        assert!(Trigger::parse(TriggerKind::Interval, &json!({})).is_err());
        assert!(Trigger::parse(TriggerKind::Interval, &json!({"hours": 0})).is_err());
        assert!(Trigger::parse(TriggerKind::Interval, &json!({"fortnights": 1})).is_err());
        assert!(Trigger::parse(TriggerKind::Interval, &json!({"hours": -1})).is_err());
    }

    #[test]
    fn test_hour_only_fires_on_the_hour() {
        let t = cron(json!({"hour": "3"}));
        assert_eq!(t.next_after(at(2024, 1, 1, 2, 59)), Some(at(2024, 1, 1, 3, 0)));
        assert_eq!(t.next_after(at(2024, 1, 1, 3, 0)), Some(at(2024, 1, 2, 3, 0)));
    }

    #[test]
    fn test_weekday_names_and_defaults() {
        // 2024-01-01 is a Monday.
        let t = cron(json!({"day_of_week": "wed,fri"}));
        assert_eq!(t.next_after(at(2024, 1, 1, 12, 0)), Some(at(2024, 1, 3, 0, 0)));
        assert_eq!(t.next_after(at(2024, 1, 3, 0, 0)), Some(at(2024, 1, 5, 0, 0)));
    }

    #[test]
    fn test_steps_and_ranges() {
        let t = cron(json!({"minute": "*/15", "hour": "9-17/4"}));
        assert_eq!(t.next_after(at(2024, 1, 1, 9, 20)), Some(at(2024, 1, 1, 9, 30)));
        assert_eq!(t.next_after(at(2024, 1, 1, 9, 45)), Some(at(2024, 1, 1, 13, 0)));
        assert_eq!(t.next_after(at(2024, 1, 1, 17, 45)), Some(at(2024, 1, 2, 9, 0)));
    }

    #[test]
    fn test_fields_above_the_given_one_stay_wildcards() {
        let t = cron(json!({"minute": 5}));
        assert_eq!(t.next_after(at(2024, 1, 1, 10, 7)), Some(at(2024, 1, 1, 11, 5)));
    }

    #[test]
    fn test_day_of_month_gets_midnight() {
        let t = cron(json!({"day": "31"}));
        assert_eq!(t.next_after(at(2024, 2, 1, 0, 0)), Some(at(2024, 3, 31, 0, 0)));
    }

    #[test]
    fn test_invalid_cron() {
        for spec in [json!({"hour": "25"}), json!({"minute": "*/0"}), json!({"hour": "5-2"}), json!({"second": "1"}), json!({"hour": true}), json!("daily")] {
            assert!(Trigger::parse(TriggerKind::Cron, &spec).is_err(), "{} should be rejected", spec);
        }
    }

    #[test]
    fn test_impossible_date_never_fires() {
        let t = cron(json!({"month": "feb", "day": "30"}));
        assert_eq!(t.next_after(at(2024, 1, 1, 0, 0)), None);
    }

    #[test]
    fn test_renders_six_field_expression() {
        match cron(json!({"day_of_week": "0-4", "hour": "9"})) {
            Trigger::Cron(c) => assert_eq!(c.expression(), "0 0 9 * * Mon,Tue,Wed,Thu,Fri"),
            other => panic!("expected cron, got {:?}", other),
        }
        match cron(json!({"month": "jun", "minute": "*/20"})) {
            Trigger::Cron(c) => assert_eq!(c.expression(), "0 0,20,40 * * 6 *"),
            other => panic!("expected cron, got {:?}", other),
        }
    }

    #[test]
    fn test_sunday_is_the_last_weekday() {
        // 2024-01-06 is a Saturday.
        let t = cron(json!({"day_of_week": "6", "hour": "1"}));
        assert_eq!(t.next_after(at(2024, 1, 6, 12, 0)), Some(at(2024, 1, 7, 1, 0)));
    }

    #[test]
    fn test_equality_compares_expanded_schedule() {
        assert_eq!(cron(json!({"hour": "3"})), cron(json!({"hour": 3, "minute": "0"})));
        assert_ne!(cron(json!({"hour": "3"})), cron(json!({"hour": "4"})));
    }
}
