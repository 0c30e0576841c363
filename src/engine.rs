use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::alarm::evaluate::{self, Verdict};
use crate::alarm::store::AlarmStore;
use crate::alarm::{Alarm, AlarmState};
use crate::config::Config;
use crate::error::CoinTrackerError;
use crate::market::cache::{MarketCache, SeriesRead};
use crate::market::indicators::{self, IndicatorSnapshot};
use crate::notify::{Delivery, Dispatcher, NotificationEvent};
use crate::storage::Storage;

const CACHE_KEY: &str = "cache";

#[derive(Debug, Default)]
pub struct CycleReport {
    pub evaluated: usize,
    pub fired: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Owns the recurring evaluation cycle: refresh market data, derive
/// indicators, evaluate every eligible alarm, commit fires, notify.
pub struct Engine {
    config: Config,
    cache: Arc<MarketCache>,
    store: Arc<AlarmStore>,
    dispatcher: Dispatcher,
    storage: Arc<dyn Storage>,
    prev_snapshots: Mutex<HashMap<String, IndicatorSnapshot>>,
}

impl Engine {
    pub fn new(
        config: Config,
        cache: Arc<MarketCache>,
        store: Arc<AlarmStore>,
        dispatcher: Dispatcher,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            config,
            cache,
            store,
            dispatcher,
            storage,
            prev_snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Drive cycles until shutdown. A tick that lands while a cycle is
    /// still running is coalesced, never queued, and shutdown waits for the
    /// in-flight cycle to drain.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.eval_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle(Utc::now().timestamp()).await;
                    if report.errors.is_empty() {
                        info!(
                            "cycle complete: {} evaluated, {} fired, {} skipped",
                            report.evaluated, report.fired, report.skipped
                        );
                    } else {
                        warn!(
                            "cycle complete with {} errors: {} evaluated, {} fired, {} skipped; {}",
                            report.errors.len(),
                            report.evaluated,
                            report.fired,
                            report.skipped,
                            report.errors.join("; ")
                        );
                    }
                }
                _ = shutdown.changed() => {
                    info!("shutdown requested, draining");
                    break;
                }
            }
        }
    }

    pub async fn run_cycle(&self, now: i64) -> CycleReport {
        let mut report = CycleReport::default();
        let alarms = self.store.list();

        for alarm in &alarms {
            if alarm.state != AlarmState::Expired && alarm.expired(now) {
                debug!("alarm {} expired", alarm.id);
                if let Err(e) = self.store.set_state(alarm.id, AlarmState::Expired) {
                    report.errors.push(e.to_string());
                }
            }
        }

        let eligible: Vec<Alarm> = alarms
            .into_iter()
            .filter(|alarm| alarm.eligible(now))
            .collect();
        let symbols: BTreeSet<String> =
            eligible.iter().map(|alarm| alarm.symbol.clone()).collect();

        let reads = join_all(symbols.iter().map(|symbol| async move {
            (symbol.clone(), self.cache.get(symbol).await)
        }))
        .await;

        let mut series: HashMap<String, SeriesRead> = HashMap::new();
        for (symbol, read) in reads {
            match read {
                Ok(read) => {
                    series.insert(symbol, read);
                }
                Err(e) => report.errors.push(e.to_string()),
            }
        }

        let mut current: HashMap<String, IndicatorSnapshot> = HashMap::new();
        for (symbol, read) in &series {
            match indicators::snapshot(symbol, &read.points, read.stale, &self.config, now) {
                Some(snapshot) => {
                    current.insert(symbol.clone(), snapshot);
                }
                None => debug!("empty price series for {}", symbol),
            }
        }

        let previous = self.prev_snapshots.lock().await.clone();

        let mut events = Vec::new();
        for alarm in &eligible {
            let snapshot = match current.get(&alarm.symbol) {
                Some(snapshot) => snapshot,
                None => {
                    report.skipped += 1;
                    continue;
                }
            };
            report.evaluated += 1;
            match evaluate::evaluate(alarm, snapshot, previous.get(&alarm.symbol)) {
                Ok(Verdict { fired: true, reason }) => {
                    if alarm.in_cooldown(now, self.config.default_cooldown_secs) {
                        debug!("alarm {} matched but is cooling down", alarm.id);
                        report.skipped += 1;
                        continue;
                    }
                    match self.store.commit_fire(alarm.id, now) {
                        Ok(()) => {
                            report.fired += 1;
                            events.push(NotificationEvent {
                                alarm_id: alarm.id,
                                owner: alarm.owner.clone(),
                                message: render_message(&reason, snapshot.stale),
                                generated_at: now,
                            });
                        }
                        Err(e) => {
                            error!("could not persist fire for alarm {}: {}", alarm.id, e);
                            report.errors.push(e.to_string());
                        }
                    }
                }
                Ok(Verdict { fired: false, .. }) => {}
                Err(CoinTrackerError::InsufficientData(what)) => {
                    debug!("alarm {} skipped: insufficient data for {}", alarm.id, what);
                    report.skipped += 1;
                }
                Err(e) => report.errors.push(format!("alarm {}: {}", alarm.id, e)),
            }
        }

        if !events.is_empty() {
            let results = self.dispatcher.dispatch(events).await;
            let dropped = results
                .iter()
                .filter(|result| **result == Delivery::Dropped)
                .count();
            if dropped > 0 {
                report.errors.push(format!("{} notifications dropped", dropped));
            }
        }

        if let Err(e) = self.persist_cache().await {
            warn!("could not persist cache snapshot: {}", e);
        }

        *self.prev_snapshots.lock().await = current;
        report
    }

    /// Out-of-band "check now" for a single alarm. Reuses the same
    /// evaluator and history without mutating any alarm state.
    pub async fn check_now(&self, id: u64) -> Result<Verdict, CoinTrackerError> {
        let alarm = self.store.get(id).ok_or_else(|| CoinTrackerError::Evaluation {
            id,
            reason: "unknown alarm".to_string(),
        })?;
        let read = self.cache.get(&alarm.symbol).await?;
        let now = Utc::now().timestamp();
        let snapshot = indicators::snapshot(&alarm.symbol, &read.points, read.stale, &self.config, now)
            .ok_or_else(|| CoinTrackerError::DataUnavailable {
                symbol: alarm.symbol.clone(),
                reason: "empty price series".to_string(),
            })?;
        let previous = self.prev_snapshots.lock().await;
        evaluate::evaluate(&alarm, &snapshot, previous.get(&alarm.symbol))
    }

    pub async fn restore_cache(&self) -> Result<(), CoinTrackerError> {
        if let Some(raw) = self.storage.load(CACHE_KEY)? {
            let snapshot = serde_json::from_str(&raw)?;
            self.cache.restore(snapshot).await;
        }
        Ok(())
    }

    async fn persist_cache(&self) -> Result<(), CoinTrackerError> {
        let snapshot = self.cache.snapshot().await;
        self.storage.save(CACHE_KEY, &serde_json::to_string(&snapshot)?)
    }
}

fn render_message(reason: &str, stale: bool) -> String {
    let mut message = format!("🔔 *Alarm*: {}", reason);
    if stale {
        message.push_str("\n⚠️ Price data may be stale.");
    }
    message
}
