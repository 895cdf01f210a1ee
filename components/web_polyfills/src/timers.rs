//! Timer polyfill.
//!
//! Installs `setTimeout`/`setInterval`/`clearTimeout`/`clearInterval` with
//! the browser signatures `(callback, delayMs, ...extraArgs) -> id` and
//! `(id) -> void`. Each realm owns its timer table and id counter; the
//! shared [`TimerHub`] thread only sleeps on deadlines and hops fired
//! timers back onto the execution lane, where liveness is re-checked
//! before the callback runs.

use crate::hub::TimerHub;
use dispatch_queue::{ExecutionLane, LaneContext};
use engine_api::{ScriptEngine, ScriptException, ValueId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Realm-unique timer identifier, monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

struct TimerRecord {
    callback: ValueId,
    extra_args: Vec<ValueId>,
    delay: Duration,
    repeat: bool,
}

struct TimerTable {
    next_id: u64,
    live: HashMap<u64, TimerRecord>,
}

/// The realm's timer subsystem.
pub struct TimerPolyfill {
    lane: ExecutionLane,
    hub: TimerHub,
    table: Mutex<TimerTable>,
    // handed to deadline jobs and installed globals so they can find the
    // subsystem again without keeping the realm alive
    self_ref: Weak<TimerPolyfill>,
}

impl TimerPolyfill {
    /// Creates the subsystem for one realm.
    pub fn new(lane: ExecutionLane, hub: TimerHub) -> Arc<TimerPolyfill> {
        Arc::new_cyclic(|weak| TimerPolyfill {
            lane,
            hub,
            table: Mutex::new(TimerTable {
                next_id: 1,
                live: HashMap::new(),
            }),
            self_ref: weak.clone(),
        })
    }

    /// Installs the four timer globals. Must run on the lane.
    pub fn install(&self, context: &LaneContext) -> Result<(), ScriptException> {
        let engine = context.engine();
        let global = engine.global();

        for (name, repeat) in [("setTimeout", false), ("setInterval", true)] {
            let weak = self.self_ref.clone();
            let function = engine.wrap_function(
                name,
                Box::new(move |engine, args| match weak.upgrade() {
                    Some(polyfill) => polyfill.handle_set(engine, args, repeat),
                    None => Ok(engine.undefined()),
                }),
            );
            engine.set_property(global, name, function)?;
        }
        for name in ["clearTimeout", "clearInterval"] {
            let weak = self.self_ref.clone();
            let function = engine.wrap_function(
                name,
                Box::new(move |engine, args| {
                    if let Some(polyfill) = weak.upgrade() {
                        polyfill.handle_clear(engine, args);
                    }
                    Ok(engine.undefined())
                }),
            );
            engine.set_property(global, name, function)?;
        }
        Ok(())
    }

    /// Schedules a callback. Returns the fresh id.
    pub fn set_timer(
        &self,
        callback: ValueId,
        delay: Duration,
        repeat: bool,
        extra_args: Vec<ValueId>,
    ) -> TimerId {
        let id = {
            let mut table = self.table.lock();
            let id = TimerId(table.next_id);
            table.next_id += 1;
            table.live.insert(
                id.0,
                TimerRecord {
                    callback,
                    extra_args,
                    delay,
                    repeat,
                },
            );
            id
        };
        log::trace!("timer {}: scheduled ({:?}, repeat={})", id.0, delay, repeat);
        self.arm(id, delay);
        id
    }

    /// Marks the timer not-live and releases its bookkeeping. Clearing an
    /// unknown or already-fired id is a no-op.
    pub fn clear_timer(&self, engine: &dyn ScriptEngine, id: TimerId) {
        match self.table.lock().live.remove(&id.0) {
            Some(record) => {
                log::trace!("timer {}: cancelled", id.0);
                release_record(engine, record);
            }
            None => log::trace!("timer {}: clear of unknown or fired id", id.0),
        }
    }

    /// Drops every pending timer without firing, releasing held script
    /// references. Must run on the lane.
    pub fn teardown(&self, context: &LaneContext) {
        let records: Vec<TimerRecord> = {
            let mut table = self.table.lock();
            table.live.drain().map(|(_, record)| record).collect()
        };
        for record in records {
            release_record(context.engine(), record);
        }
    }

    /// Number of timers currently live.
    pub fn live_timers(&self) -> usize {
        self.table.lock().live.len()
    }

    fn arm(&self, id: TimerId, delay: Duration) {
        let weak = self.self_ref.clone();
        let lane = self.lane.clone();
        self.hub.schedule(delay, move || {
            let Some(polyfill) = weak.upgrade() else {
                return;
            };
            let outcome = lane.submit(move |context| polyfill.fire(context, id));
            if outcome.is_err() {
                log::trace!("timer {}: fired after lane shutdown", id.0);
            }
        });
    }

    fn fire(&self, context: &LaneContext, id: TimerId) {
        let record = {
            let table = self.table.lock();
            table
                .live
                .get(&id.0)
                .map(|r| (r.callback, r.extra_args.clone(), r.delay, r.repeat))
        };
        let Some((callback, extra_args, delay, repeat)) = record else {
            // cancelled between scheduling and firing
            log::trace!("timer {}: no longer live, skipping fire", id.0);
            return;
        };

        let engine = context.engine();
        if let Err(exception) = engine.call_function(callback, None, &extra_args) {
            log::warn!("timer {}: callback raised: {}", id.0, exception);
        }

        // the callback may have cleared its own id
        if !self.table.lock().live.contains_key(&id.0) {
            return;
        }
        if repeat {
            self.arm(id, delay);
        } else if let Some(record) = self.table.lock().live.remove(&id.0) {
            release_record(engine, record);
        }
    }

    fn handle_set(
        &self,
        engine: &dyn ScriptEngine,
        args: &[ValueId],
        repeat: bool,
    ) -> Result<ValueId, ScriptException> {
        let Some(&callback) = args.first() else {
            return Ok(engine.undefined());
        };
        if !engine.is_callable(callback) {
            return Ok(engine.undefined());
        }
        let delay = parse_delay(engine, args.get(1));
        let extra_args = args.get(2..).unwrap_or(&[]).to_vec();
        let id = self.set_timer(callback, delay, repeat, extra_args);
        engine.value_from_json(&id.0.to_string())
    }

    fn handle_clear(&self, engine: &dyn ScriptEngine, args: &[ValueId]) {
        if let Some(id) = args
            .first()
            .and_then(|arg| engine.value_to_json(*arg).ok())
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|n| n.is_finite() && *n >= 0.0)
        {
            self.clear_timer(engine, TimerId(id as u64));
        }
    }
}

fn release_record(engine: &dyn ScriptEngine, record: TimerRecord) {
    engine.release(record.callback);
    for arg in record.extra_args {
        engine.release(arg);
    }
}

/// A missing, non-numeric, NaN, or negative delay is treated as zero.
fn parse_delay(engine: &dyn ScriptEngine, arg: Option<&ValueId>) -> Duration {
    let millis = arg
        .and_then(|arg| engine.value_to_json(*arg).ok())
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .unwrap_or(0.0);
    Duration::from_secs_f64(millis / 1000.0)
}
