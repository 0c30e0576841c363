pub mod evaluate;
pub mod store;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Active,
    Paused,
    Fired,
    Expired,
}

/// Closed set of trigger conditions. Adding a kind means adding a variant
/// here and a match arm in `evaluate`; there is no shared mutable base state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlarmCondition {
    PriceAbove { target: f64 },
    PriceBelow { target: f64 },
    PercentChange { percent: f64, window_minutes: i64 },
    IndicatorAbove { indicator: String, value: f64 },
    IndicatorBelow { indicator: String, value: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alarm {
    pub id: u64,
    pub owner: String,
    pub symbol: String,
    pub condition: AlarmCondition,
    pub state: AlarmState,
    pub last_fired: Option<i64>,
    pub cooldown_secs: Option<u64>,
    pub trigger_count: u32,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

impl Alarm {
    pub fn cooldown(&self, default_secs: u64) -> i64 {
        self.cooldown_secs.unwrap_or(default_secs) as i64
    }

    /// True while a previous fire still suppresses re-firing, regardless of
    /// whether the condition is currently true.
    pub fn in_cooldown(&self, now: i64, default_secs: u64) -> bool {
        self.last_fired
            .map_or(false, |t| now < t + self.cooldown(default_secs))
    }

    pub fn expired(&self, now: i64) -> bool {
        self.expires_at.map_or(false, |t| now >= t)
    }

    /// Whether the scheduler should evaluate this alarm at all. Cooldown is
    /// checked separately after evaluation so crossings are still observed.
    pub fn eligible(&self, now: i64) -> bool {
        matches!(self.state, AlarmState::Active | AlarmState::Fired) && !self.expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn cooldown_falls_back_to_default() {
        let mut alarm = testutil::alarm(1, "BTC", AlarmCondition::PriceAbove { target: 100.0 });
        alarm.last_fired = Some(1_000);
        assert!(alarm.in_cooldown(1_500, 900));
        assert!(!alarm.in_cooldown(1_900, 900));

        alarm.cooldown_secs = Some(100);
        assert!(!alarm.in_cooldown(1_500, 900));
    }

    #[test]
    fn paused_and_expired_alarms_are_not_eligible() {
        let mut alarm = testutil::alarm(1, "BTC", AlarmCondition::PriceAbove { target: 100.0 });
        assert!(alarm.eligible(1_000));

        alarm.state = AlarmState::Paused;
        assert!(!alarm.eligible(1_000));

        alarm.state = AlarmState::Active;
        alarm.expires_at = Some(500);
        assert!(!alarm.eligible(1_000));
    }

    #[test]
    fn condition_serialization_is_tagged() {
        let condition = AlarmCondition::IndicatorAbove {
            indicator: "rsi_14".to_string(),
            value: 70.0,
        };
        let raw = serde_json::to_string(&condition).unwrap();
        assert!(raw.contains(r#""type":"indicator_above""#), "{}", raw);
        let back: AlarmCondition = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, condition);
    }
}
