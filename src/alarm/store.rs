use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::alarm::{Alarm, AlarmCondition, AlarmState};
use crate::error::CoinTrackerError;
use crate::storage::Storage;

const ALARMS_KEY: &str = "alarms";

/// Single source of truth for alarm state, shared between the evaluation
/// cycle and the user-facing management calls. Entries lock individually;
/// there is no store-wide lock. A mutation is not considered applied until
/// it has been persisted, so failed writes roll the in-memory change back.
pub struct AlarmStore {
    alarms: DashMap<u64, Alarm>,
    next_id: AtomicU64,
    storage: Arc<dyn Storage>,
}

impl AlarmStore {
    pub fn load(storage: Arc<dyn Storage>) -> Result<Self, CoinTrackerError> {
        let alarms = DashMap::new();
        let mut max_id = 0;
        if let Some(raw) = storage.load(ALARMS_KEY)? {
            let list: Vec<Alarm> = serde_json::from_str(&raw)?;
            for alarm in list {
                max_id = max_id.max(alarm.id);
                alarms.insert(alarm.id, alarm);
            }
        }
        Ok(Self {
            alarms,
            next_id: AtomicU64::new(max_id + 1),
            storage,
        })
    }

    pub fn add(
        &self,
        owner: &str,
        symbol: &str,
        condition: AlarmCondition,
        cooldown_secs: Option<u64>,
        expires_at: Option<i64>,
        now: i64,
    ) -> Result<u64, CoinTrackerError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let alarm = Alarm {
            id,
            owner: owner.to_string(),
            symbol: symbol.to_uppercase(),
            condition,
            state: AlarmState::Active,
            last_fired: None,
            cooldown_secs,
            trigger_count: 0,
            created_at: now,
            expires_at,
        };
        self.alarms.insert(id, alarm);
        if let Err(e) = self.persist() {
            self.alarms.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    pub fn remove(&self, id: u64) -> Result<bool, CoinTrackerError> {
        match self.alarms.remove(&id) {
            Some((_, alarm)) => {
                if let Err(e) = self.persist() {
                    self.alarms.insert(id, alarm);
                    return Err(e);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn pause(&self, id: u64) -> Result<(), CoinTrackerError> {
        self.set_state(id, AlarmState::Paused)
    }

    pub fn resume(&self, id: u64) -> Result<(), CoinTrackerError> {
        self.set_state(id, AlarmState::Active)
    }

    pub fn set_state(&self, id: u64, state: AlarmState) -> Result<(), CoinTrackerError> {
        let previous = {
            let mut alarm = self.alarms.get_mut(&id).ok_or_else(|| {
                CoinTrackerError::Evaluation {
                    id,
                    reason: "unknown alarm".to_string(),
                }
            })?;
            let previous = alarm.state;
            alarm.state = state;
            previous
        };
        if let Err(e) = self.persist() {
            if let Some(mut alarm) = self.alarms.get_mut(&id) {
                alarm.state = previous;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Record a fire: state, last-fired timestamp and trigger count move
    /// together, and only once the write has been persisted.
    pub fn commit_fire(&self, id: u64, now: i64) -> Result<(), CoinTrackerError> {
        let previous = {
            let mut alarm = self.alarms.get_mut(&id).ok_or_else(|| {
                CoinTrackerError::Evaluation {
                    id,
                    reason: "unknown alarm".to_string(),
                }
            })?;
            let previous = (alarm.state, alarm.last_fired, alarm.trigger_count);
            alarm.state = AlarmState::Fired;
            alarm.last_fired = Some(now);
            alarm.trigger_count += 1;
            previous
        };
        if let Err(e) = self.persist() {
            if let Some(mut alarm) = self.alarms.get_mut(&id) {
                alarm.state = previous.0;
                alarm.last_fired = previous.1;
                alarm.trigger_count = previous.2;
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<Alarm> {
        self.alarms.get(&id).map(|alarm| alarm.clone())
    }

    pub fn list(&self) -> Vec<Alarm> {
        let mut list: Vec<Alarm> = self.alarms.iter().map(|a| a.value().clone()).collect();
        list.sort_by_key(|alarm| alarm.id);
        list
    }

    pub fn owned_by(&self, owner: &str) -> Vec<Alarm> {
        let mut list: Vec<Alarm> = self
            .alarms
            .iter()
            .filter(|a| a.value().owner == owner)
            .map(|a| a.value().clone())
            .collect();
        list.sort_by_key(|alarm| alarm.id);
        list
    }

    fn persist(&self) -> Result<(), CoinTrackerError> {
        let raw = serde_json::to_string_pretty(&self.list())?;
        self.storage.save(ALARMS_KEY, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryStorage;
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn store() -> (AlarmStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = AlarmStore::load(storage.clone()).unwrap();
        (store, storage)
    }

    #[test]
    fn add_persists_and_survives_reload() {
        let (store, storage) = store();
        let id = store
            .add(
                "42",
                "btc",
                AlarmCondition::PriceAbove { target: 90_000.0 },
                None,
                None,
                1_000,
            )
            .unwrap();

        let reloaded = AlarmStore::load(storage).unwrap();
        let alarm = reloaded.get(id).unwrap();
        assert_eq!(alarm.symbol, "BTC");
        assert_eq!(alarm.state, AlarmState::Active);

        // Ids keep increasing after a reload.
        let next = reloaded
            .add(
                "42",
                "ETH",
                AlarmCondition::PriceBelow { target: 2_000.0 },
                None,
                None,
                1_001,
            )
            .unwrap();
        assert!(next > id);
    }

    #[test]
    fn failed_persist_rolls_back_add() {
        let (store, storage) = store();
        storage.fail_saves.store(true, AtomicOrdering::SeqCst);
        let result = store.add(
            "42",
            "BTC",
            AlarmCondition::PriceAbove { target: 1.0 },
            None,
            None,
            1_000,
        );
        assert!(result.is_err());
        assert!(store.list().is_empty());
    }

    #[test]
    fn commit_fire_updates_state_and_count() {
        let (store, _) = store();
        let id = store
            .add(
                "42",
                "BTC",
                AlarmCondition::PriceAbove { target: 1.0 },
                None,
                None,
                1_000,
            )
            .unwrap();

        store.commit_fire(id, 2_000).unwrap();
        let alarm = store.get(id).unwrap();
        assert_eq!(alarm.state, AlarmState::Fired);
        assert_eq!(alarm.last_fired, Some(2_000));
        assert_eq!(alarm.trigger_count, 1);
    }

    #[test]
    fn failed_persist_rolls_back_fire() {
        let (store, storage) = store();
        let id = store
            .add(
                "42",
                "BTC",
                AlarmCondition::PriceAbove { target: 1.0 },
                None,
                None,
                1_000,
            )
            .unwrap();

        storage.fail_saves.store(true, AtomicOrdering::SeqCst);
        assert!(store.commit_fire(id, 2_000).is_err());

        let alarm = store.get(id).unwrap();
        assert_eq!(alarm.state, AlarmState::Active);
        assert_eq!(alarm.last_fired, None);
        assert_eq!(alarm.trigger_count, 0);
    }

    #[test]
    fn pause_and_resume() {
        let (store, _) = store();
        let id = store
            .add(
                "42",
                "BTC",
                AlarmCondition::PriceAbove { target: 1.0 },
                None,
                None,
                1_000,
            )
            .unwrap();

        store.pause(id).unwrap();
        assert_eq!(store.get(id).unwrap().state, AlarmState::Paused);
        store.resume(id).unwrap();
        assert_eq!(store.get(id).unwrap().state, AlarmState::Active);
    }

    #[test]
    fn owned_by_filters_by_owner() {
        let (store, _) = store();
        store
            .add("1", "BTC", AlarmCondition::PriceAbove { target: 1.0 }, None, None, 0)
            .unwrap();
        store
            .add("2", "ETH", AlarmCondition::PriceAbove { target: 1.0 }, None, None, 0)
            .unwrap();
        assert_eq!(store.owned_by("1").len(), 1);
        assert_eq!(store.owned_by("1")[0].symbol, "BTC");
    }
}
