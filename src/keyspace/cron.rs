//! Periodic Key Space Maintenance
//!
//! A reactor timer that wakes up at a fixed interval and:
//! 1. Counts the tick
//! 2. Every few ticks, logs per-database statistics and a summary
//! 3. Shrinks databases whose tables became sparse
//! 4. Stops the loop once the configured number of ticks has run
//!
//! ## Sharing The Key Space
//!
//! The timer callback and the rest of the server both need the key space,
//! so it lives behind `Rc<RefCell<_>>`. Everything runs on the loop's
//! thread; a tick that finds the key space already borrowed skips its
//! maintenance work instead of panicking.

use crate::event::{EventError, EventLoop, TimerAction, TimerId};
use crate::keyspace::space::Keyspace;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, trace, warn};

/// Configuration for the key space cron.
#[derive(Debug, Clone)]
pub struct CronConfig {
    /// Milliseconds between ticks (default: 1000)
    pub interval_ms: u64,

    /// Stop the event loop after this many ticks (default: never)
    pub max_loops: Option<u64>,

    /// Log statistics every this many ticks (default: 5)
    pub stats_every: u64,

    /// Also log databases without keys (default: false)
    pub log_empty: bool,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_loops: None,
            stats_every: 5,
            log_empty: false,
        }
    }
}

/// A handle to an installed cron timer.
#[derive(Debug, Clone)]
pub struct CronHandle {
    id: TimerId,
    loops: Rc<Cell<u64>>,
}

impl CronHandle {
    /// Returns the id of the cron timer.
    pub fn timer_id(&self) -> TimerId {
        self.id
    }

    /// Returns the number of ticks run so far.
    pub fn loops(&self) -> u64 {
        self.loops.get()
    }
}

/// The key space maintenance timer.
#[derive(Debug)]
pub struct ServerCron {
    keyspace: Rc<RefCell<Keyspace>>,
    config: CronConfig,
    loops: Rc<Cell<u64>>,
}

impl ServerCron {
    /// Installs the cron on `el`. The first tick runs one interval from now.
    ///
    /// # Example
    ///
    /// ```
    /// use emberkv::event::EventLoop;
    /// use emberkv::keyspace::{CronConfig, Keyspace, ServerCron};
    /// use emberkv::memory::MemoryTracker;
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let keyspace = Rc::new(RefCell::new(Keyspace::new(16, MemoryTracker::new())));
    /// let mut el = EventLoop::new();
    ///
    /// let config = CronConfig {
    ///     interval_ms: 1,
    ///     max_loops: Some(3),
    ///     ..Default::default()
    /// };
    /// let cron = ServerCron::install(&mut el, keyspace, config).unwrap();
    ///
    /// el.run();
    /// assert_eq!(cron.loops(), 3);
    /// ```
    pub fn install(
        el: &mut EventLoop,
        keyspace: Rc<RefCell<Keyspace>>,
        config: CronConfig,
    ) -> Result<CronHandle, EventError> {
        let loops = Rc::new(Cell::new(0));
        let interval = config.interval_ms;
        let mut cron = ServerCron {
            keyspace,
            config,
            loops: Rc::clone(&loops),
        };

        let id = el.create_time_event(
            interval,
            move |el: &mut EventLoop, _id| cron.tick(el),
            Some(Box::new(|_el: &mut EventLoop| debug!("Server cron removed"))),
        )?;

        info!(interval_ms = interval, "Server cron installed");
        Ok(CronHandle { id, loops })
    }

    /// Runs one tick.
    fn tick(&mut self, el: &mut EventLoop) -> TimerAction {
        let loops = self.loops.get() + 1;
        self.loops.set(loops);

        match self.keyspace.try_borrow_mut() {
            Ok(mut keyspace) => {
                if self.config.stats_every > 0 && loops % self.config.stats_every == 0 {
                    self.log_stats(&keyspace, loops);
                }

                let resized = keyspace.try_resize_tables();
                if resized > 0 {
                    debug!(resized, "Sparse databases shrunk");
                }
            }
            Err(_) => {
                warn!(loops, "Key space busy, skipping maintenance");
            }
        }

        if let Some(max) = self.config.max_loops {
            if loops >= max {
                info!(loops, "Server cron reached its tick limit, stopping");
                el.stop();
            }
        }

        trace!(loops, "Server cron tick");
        TimerAction::Again(self.config.interval_ms)
    }

    fn log_stats(&self, keyspace: &Keyspace, loops: u64) {
        for (index, db) in keyspace.iter() {
            if db.is_empty() && !self.config.log_empty {
                continue;
            }
            debug!(db = index, keys = db.len(), slots = db.size(), "Database stats");
        }

        let stats = keyspace.stats();
        info!(
            loops,
            keys = stats.keys,
            slots = stats.slots,
            used_memory = stats.used_memory,
            "Key space summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ManualClock, ProcessFlags, When};
    use crate::memory::MemoryTracker;
    use bytes::Bytes;

    fn poll() -> ProcessFlags {
        ProcessFlags::ALL_EVENTS | ProcessFlags::DONT_WAIT
    }

    fn setup(config: CronConfig) -> (EventLoop, ManualClock, Rc<RefCell<Keyspace>>, CronHandle) {
        let clock = ManualClock::new(When::new(0, 0));
        let mut el = EventLoop::with_clock(clock.clone());
        let keyspace = Rc::new(RefCell::new(Keyspace::new(4, MemoryTracker::new())));
        let cron = ServerCron::install(&mut el, Rc::clone(&keyspace), config).unwrap();
        (el, clock, keyspace, cron)
    }

    #[test]
    fn test_cron_ticks_on_interval() {
        let config = CronConfig {
            interval_ms: 100,
            ..Default::default()
        };
        let (mut el, clock, _keyspace, cron) = setup(config);

        assert_eq!(el.process_events(poll()).unwrap(), 0);
        assert_eq!(cron.loops(), 0);

        clock.advance(100);
        assert_eq!(el.process_events(poll()).unwrap(), 1);
        clock.advance(100);
        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(cron.loops(), 2);
    }

    #[test]
    fn test_cron_shrinks_sparse_db() {
        let config = CronConfig {
            interval_ms: 10,
            ..Default::default()
        };
        let (mut el, clock, keyspace, _cron) = setup(config);

        {
            let mut keyspace = keyspace.borrow_mut();
            let db = keyspace.db_mut(2).unwrap();
            for i in 0..64 {
                db.insert(Bytes::from(format!("k{}", i)), Bytes::from("v"))
                    .unwrap();
            }
            for i in 1..64 {
                db.delete(&Bytes::from(format!("k{}", i))).unwrap();
            }
            assert_eq!(db.size(), 64);
        }

        clock.advance(10);
        el.process_events(poll()).unwrap();

        let keyspace = keyspace.borrow();
        assert_eq!(keyspace.db(2).unwrap().size(), 4);
        assert_eq!(keyspace.total_keys(), 1);
    }

    #[test]
    fn test_cron_stops_loop_after_max_loops() {
        let config = CronConfig {
            interval_ms: 0,
            max_loops: Some(3),
            ..Default::default()
        };
        let (mut el, _clock, _keyspace, cron) = setup(config);

        el.run();
        assert_eq!(cron.loops(), 3);
        assert!(el.is_stopped());
    }

    #[test]
    fn test_cron_skips_busy_keyspace() {
        let config = CronConfig {
            interval_ms: 10,
            ..Default::default()
        };
        let (mut el, clock, keyspace, cron) = setup(config);

        let _guard = keyspace.borrow_mut();
        clock.advance(10);
        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(cron.loops(), 1);
    }

    #[test]
    fn test_cron_can_be_removed() {
        let (mut el, clock, _keyspace, cron) = setup(CronConfig::default());

        el.delete_time_event(cron.timer_id()).unwrap();
        clock.advance(5000);
        assert_eq!(el.process_events(poll()).unwrap(), 0);
        assert_eq!(cron.loops(), 0);
    }
}
