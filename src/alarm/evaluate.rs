use crate::alarm::{Alarm, AlarmCondition};
use crate::error::CoinTrackerError;
use crate::market::indicators::{self, IndicatorSnapshot};

#[derive(Debug, Clone)]
pub struct Verdict {
    pub fired: bool,
    pub reason: String,
}

impl Verdict {
    fn fired(reason: String) -> Self {
        Self {
            fired: true,
            reason,
        }
    }

    fn quiet(reason: &str) -> Self {
        Self {
            fired: false,
            reason: reason.to_string(),
        }
    }
}

/// Evaluate one alarm against the current and previous cycle's snapshots.
/// Side-effect-free: state transitions and notifications are the caller's
/// job. Crossing conditions compare against the previous snapshot, so a
/// condition that is merely still true does not fire again.
pub fn evaluate(
    alarm: &Alarm,
    current: &IndicatorSnapshot,
    previous: Option<&IndicatorSnapshot>,
) -> Result<Verdict, CoinTrackerError> {
    let previous = match previous {
        Some(previous) => previous,
        None => return Ok(Verdict::quiet("no previous snapshot, seeding history")),
    };

    match &alarm.condition {
        AlarmCondition::PriceAbove { target } => {
            if current.price > *target && previous.price <= *target {
                Ok(Verdict::fired(format!(
                    "{} rose above {:.2} (current: {:.2})",
                    alarm.symbol, target, current.price
                )))
            } else {
                Ok(Verdict::quiet("no upward crossing"))
            }
        }
        AlarmCondition::PriceBelow { target } => {
            if current.price < *target && previous.price >= *target {
                Ok(Verdict::fired(format!(
                    "{} dropped below {:.2} (current: {:.2})",
                    alarm.symbol, target, current.price
                )))
            } else {
                Ok(Verdict::quiet("no downward crossing"))
            }
        }
        AlarmCondition::PercentChange {
            percent,
            window_minutes,
        } => {
            let window_secs = window_minutes * 60;
            let change = indicators::percent_change(&current.points, window_secs, current.timestamp)
                .ok_or_else(|| {
                    CoinTrackerError::InsufficientData(format!(
                        "{}min change for {}",
                        window_minutes, alarm.symbol
                    ))
                })?;
            let previous_change =
                indicators::percent_change(&previous.points, window_secs, previous.timestamp);
            match previous_change {
                Some(previous_change)
                    if change.abs() >= *percent && previous_change.abs() < *percent =>
                {
                    let direction = if change > 0.0 { "risen" } else { "fallen" };
                    Ok(Verdict::fired(format!(
                        "{} has {} {:.2}% within {}min",
                        alarm.symbol,
                        direction,
                        change.abs(),
                        window_minutes
                    )))
                }
                Some(_) => Ok(Verdict::quiet("change within bound or still beyond it")),
                None => Ok(Verdict::quiet("change history seeding")),
            }
        }
        AlarmCondition::IndicatorAbove { indicator, value } => {
            let current_value = lookup(alarm, current, indicator)?;
            match previous.value(indicator) {
                Some(previous_value) if current_value > *value && previous_value <= *value => {
                    Ok(Verdict::fired(format!(
                        "{} {} crossed above {:.2} (current: {:.2})",
                        alarm.symbol, indicator, value, current_value
                    )))
                }
                Some(_) => Ok(Verdict::quiet("no upward indicator crossing")),
                None => Ok(Verdict::quiet("indicator history seeding")),
            }
        }
        AlarmCondition::IndicatorBelow { indicator, value } => {
            let current_value = lookup(alarm, current, indicator)?;
            match previous.value(indicator) {
                Some(previous_value) if current_value < *value && previous_value >= *value => {
                    Ok(Verdict::fired(format!(
                        "{} {} crossed below {:.2} (current: {:.2})",
                        alarm.symbol, indicator, value, current_value
                    )))
                }
                Some(_) => Ok(Verdict::quiet("no downward indicator crossing")),
                None => Ok(Verdict::quiet("indicator history seeding")),
            }
        }
    }
}

fn lookup(
    alarm: &Alarm,
    snapshot: &IndicatorSnapshot,
    name: &str,
) -> Result<f64, CoinTrackerError> {
    match snapshot.value(name) {
        Some(value) => Ok(value),
        None if indicators::is_supported(name) => Err(CoinTrackerError::InsufficientData(format!(
            "{} for {}",
            name, alarm.symbol
        ))),
        None => Err(CoinTrackerError::Evaluation {
            id: alarm.id,
            reason: format!("unknown indicator '{}'", name),
        }),
    }
}
