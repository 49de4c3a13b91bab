//! Event Loop
//!
//! A single-threaded reactor over file descriptor readiness and software
//! timers. Everything runs on the thread that owns the loop; callbacks get
//! `&mut EventLoop` and may register or remove events (including their
//! own) while they run.
//!
//! ## One Pass of `process_events`
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ 1. build read / write / except sets from every file event  │
//! │ 2. select(2) with timeout = time until the nearest timer   │
//! │    (zero with DONT_WAIT, forever with no timers)           │
//! │ 3. for each ready fd: run its callback, clear the fd from  │
//! │    all three sets, restart the scan from the head          │
//! │ 4. for each due timer (id below the pass snapshot): run it │
//! │    NoMore    ──> remove it and run its finalizer           │
//! │    Again(ms) ──> reschedule to now + ms                    │
//! │    restart the scan from the head                          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Restarting from the head after every callback keeps the scan correct
//! when a callback changes the event lists underneath it. The id snapshot
//! keeps timers created during the pass from firing in that same pass, and
//! a timer fires at most once per pass even if it reschedules itself with
//! a zero delay.

use crate::event::mask::{Mask, ProcessFlags};
use crate::event::select::{fd_in_range, select, FdSet};
use crate::event::time::{Clock, SystemClock, When};
use crate::memory::{MemoryTracker, OutOfMemory};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Callback run when a file descriptor is ready. Receives the ready subset
/// of the registered mask.
pub type FileProc = Box<dyn FnMut(&mut EventLoop, RawFd, Mask)>;

/// Callback run when a timer is due.
pub type TimeProc = Box<dyn FnMut(&mut EventLoop, TimerId) -> TimerAction>;

/// Callback run once when an event is removed from the loop.
pub type Finalizer = Box<dyn FnOnce(&mut EventLoop)>;

/// Errors returned by the event loop.
#[derive(Debug, Error)]
pub enum EventError {
    /// No timer with this id is registered
    #[error("no timer with id {0}")]
    NotFound(TimerId),

    /// The readiness wait failed
    #[error("readiness wait failed: {0}")]
    WaitFailed(#[source] io::Error),

    /// The descriptor cannot be watched with select(2)
    #[error("file descriptor {0} out of range")]
    FdOutOfRange(RawFd),

    /// The memory tracker refused an allocation
    #[error(transparent)]
    OutOfMemory(#[from] OutOfMemory),
}

/// Identifier of a timer, unique for the lifetime of its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a timer wants after it fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Fire again this many milliseconds from now
    Again(u64),
    /// Remove the timer (running its finalizer)
    NoMore,
}

struct FileEvent {
    fd: RawFd,
    mask: Mask,
    /// Internal identity; several events may share fd and mask
    token: u64,
    /// Taken out while the callback runs
    proc: Option<FileProc>,
    finalizer: Option<Finalizer>,
}

struct TimeEvent {
    id: TimerId,
    when: When,
    proc: Option<TimeProc>,
    finalizer: Option<Finalizer>,
}

/// The reactor.
///
/// # Example
///
/// ```
/// use emberkv::event::{EventLoop, TimerAction};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let mut el = EventLoop::new();
/// let ticks = Rc::new(Cell::new(0));
///
/// let counter = ticks.clone();
/// el.create_time_event(
///     1,
///     move |el: &mut EventLoop, _id| {
///         counter.set(counter.get() + 1);
///         if counter.get() == 3 {
///             el.stop();
///         }
///         TimerAction::Again(1)
///     },
///     None,
/// )
/// .unwrap();
///
/// el.run();
/// assert_eq!(ticks.get(), 3);
/// ```
pub struct EventLoop {
    /// Registered file events, newest first
    file_events: VecDeque<FileEvent>,

    /// Registered timers, newest first
    time_events: VecDeque<TimeEvent>,

    /// Id handed to the next timer
    next_timer_id: u64,

    /// Token handed to the next file event
    next_file_token: u64,

    /// Set by `stop`, checked once per pass by `run`
    stop: bool,

    /// Time source for timers
    clock: Box<dyn Clock>,

    /// Accounting for event records
    memory: MemoryTracker,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("file_events", &self.file_events.len())
            .field("time_events", &self.time_events.len())
            .field("next_timer_id", &self.next_timer_id)
            .field("stop", &self.stop)
            .finish()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Creates an empty loop on the system clock.
    pub fn new() -> Self {
        Self::with_clock_and_memory(SystemClock, MemoryTracker::new())
    }

    /// Creates an empty loop reading time from `clock`.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self::with_clock_and_memory(clock, MemoryTracker::new())
    }

    /// Creates an empty loop that charges its event records to `memory`.
    pub fn with_memory(memory: MemoryTracker) -> Self {
        Self::with_clock_and_memory(SystemClock, memory)
    }

    /// Creates an empty loop with both a clock and a memory tracker.
    pub fn with_clock_and_memory(clock: impl Clock + 'static, memory: MemoryTracker) -> Self {
        Self {
            file_events: VecDeque::new(),
            time_events: VecDeque::new(),
            next_timer_id: 0,
            next_file_token: 0,
            stop: false,
            clock: Box::new(clock),
            memory,
        }
    }

    /// Returns the current time on the loop's clock.
    pub fn now(&self) -> When {
        self.clock.now()
    }

    /// Returns the memory tracker this loop charges.
    pub fn memory(&self) -> &MemoryTracker {
        &self.memory
    }

    /// Returns the number of registered file events.
    pub fn file_event_count(&self) -> usize {
        self.file_events.len()
    }

    /// Returns the number of registered timers.
    pub fn time_event_count(&self) -> usize {
        self.time_events.len()
    }

    /// Returns true once `stop` was called and `run` has not restarted.
    pub fn is_stopped(&self) -> bool {
        self.stop
    }

    /// Registers interest in `mask` conditions on `fd`.
    ///
    /// Registering the same fd again with another mask adds an independent
    /// event.
    ///
    /// # Errors
    ///
    /// - `FdOutOfRange` if `fd` cannot be watched
    /// - `OutOfMemory` if the record cannot be charged
    pub fn create_file_event<F>(
        &mut self,
        fd: RawFd,
        mask: Mask,
        proc: F,
        finalizer: Option<Finalizer>,
    ) -> Result<(), EventError>
    where
        F: FnMut(&mut EventLoop, RawFd, Mask) + 'static,
    {
        if !fd_in_range(fd) {
            return Err(EventError::FdOutOfRange(fd));
        }
        self.memory.try_alloc(mem::size_of::<FileEvent>())?;

        let token = self.next_file_token;
        self.next_file_token += 1;
        self.file_events.push_front(FileEvent {
            fd,
            mask,
            token,
            proc: Some(Box::new(proc)),
            finalizer,
        });

        debug!(fd, mask = ?mask, "File event registered");
        Ok(())
    }

    /// Removes the first file event registered for exactly `fd` and `mask`,
    /// running its finalizer. Does nothing if there is none.
    pub fn delete_file_event(&mut self, fd: RawFd, mask: Mask) {
        let Some(pos) = self
            .file_events
            .iter()
            .position(|fe| fe.fd == fd && fe.mask == mask)
        else {
            return;
        };

        if let Some(fe) = self.file_events.remove(pos) {
            self.memory.free(mem::size_of::<FileEvent>());
            debug!(fd, mask = ?mask, "File event removed");
            if let Some(finalizer) = fe.finalizer {
                finalizer(self);
            }
        }
    }

    /// Schedules `proc` to run `milliseconds` from now.
    ///
    /// # Returns
    ///
    /// The id of the new timer.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if the record cannot be charged.
    pub fn create_time_event<F>(
        &mut self,
        milliseconds: u64,
        proc: F,
        finalizer: Option<Finalizer>,
    ) -> Result<TimerId, EventError>
    where
        F: FnMut(&mut EventLoop, TimerId) -> TimerAction + 'static,
    {
        self.memory.try_alloc(mem::size_of::<TimeEvent>())?;

        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;
        let when = self.clock.now().add_millis(milliseconds);
        self.time_events.push_front(TimeEvent {
            id,
            when,
            proc: Some(Box::new(proc)),
            finalizer,
        });

        debug!(id = id.0, when = %when, "Timer registered");
        Ok(id)
    }

    /// Removes a timer, running its finalizer.
    ///
    /// # Errors
    ///
    /// `NotFound` if no timer has this id.
    pub fn delete_time_event(&mut self, id: TimerId) -> Result<(), EventError> {
        let pos = self
            .time_events
            .iter()
            .position(|te| te.id == id)
            .ok_or(EventError::NotFound(id))?;

        if let Some(te) = self.time_events.remove(pos) {
            self.memory.free(mem::size_of::<TimeEvent>());
            debug!(id = id.0, "Timer removed");
            if let Some(finalizer) = te.finalizer {
                finalizer(self);
            }
        }
        Ok(())
    }

    /// Finds the timer that fires first. Timers are unordered, so this is a
    /// linear scan.
    fn nearest_timer(&self) -> Option<When> {
        self.time_events.iter().map(|te| te.when).min()
    }

    /// Runs one pass: waits for readiness (as allowed by `flags`), then
    /// dispatches ready file events and due timers.
    ///
    /// # Returns
    ///
    /// The number of callbacks invoked, file and time events together.
    /// Classic `ae` loops count file events only; due timers count here too.
    ///
    /// # Errors
    ///
    /// `WaitFailed` if `select(2)` fails for a reason other than an
    /// interrupt. No callback runs in that case.
    pub fn process_events(&mut self, flags: ProcessFlags) -> Result<usize, EventError> {
        let wants_files = flags.contains(ProcessFlags::FILE_EVENTS);
        let wants_timers = flags.contains(ProcessFlags::TIME_EVENTS);
        let dont_wait = flags.contains(ProcessFlags::DONT_WAIT);

        if !wants_files && !wants_timers {
            return Ok(0);
        }

        let mut processed = 0;
        let mut rfds = FdSet::new();
        let mut wfds = FdSet::new();
        let mut efds = FdSet::new();
        let mut maxfd: RawFd = -1;
        let mut numfd = 0;

        if wants_files {
            for fe in &self.file_events {
                if fe.mask.contains(Mask::READABLE) {
                    rfds.insert(fe.fd);
                }
                if fe.mask.contains(Mask::WRITABLE) {
                    wfds.insert(fe.fd);
                }
                if fe.mask.contains(Mask::EXCEPTION) {
                    efds.insert(fe.fd);
                }
                maxfd = maxfd.max(fe.fd);
                numfd += 1;
            }
        }

        if numfd > 0 || (wants_timers && !dont_wait) {
            let nearest = if wants_timers && !dont_wait {
                self.nearest_timer()
            } else {
                None
            };
            let timeout = match nearest {
                Some(when) => Some(self.clock.now().millis_until(when)),
                None if dont_wait => Some(0),
                None => None,
            };

            let ready = select(maxfd + 1, &mut rfds, &mut wfds, &mut efds, timeout)
                .map_err(EventError::WaitFailed)?;

            if ready > 0 {
                processed += self.dispatch_file_events(&mut rfds, &mut wfds, &mut efds);
            }
        }

        if wants_timers {
            processed += self.dispatch_time_events();
        }

        Ok(processed)
    }

    fn dispatch_file_events(
        &mut self,
        rfds: &mut FdSet,
        wfds: &mut FdSet,
        efds: &mut FdSet,
    ) -> usize {
        let mut processed = 0;
        let mut i = 0;

        while let Some(fe) = self.file_events.get_mut(i) {
            let fd = fe.fd;
            let mut ready = Mask::NONE;
            if fe.mask.contains(Mask::READABLE) && rfds.contains(fd) {
                ready |= Mask::READABLE;
            }
            if fe.mask.contains(Mask::WRITABLE) && wfds.contains(fd) {
                ready |= Mask::WRITABLE;
            }
            if fe.mask.contains(Mask::EXCEPTION) && efds.contains(fd) {
                ready |= Mask::EXCEPTION;
            }

            // No proc means an outer pass is running it right now
            let proc = if ready.is_empty() { None } else { fe.proc.take() };
            let Some(mut proc) = proc else {
                i += 1;
                continue;
            };

            let token = fe.token;
            trace!(fd, ready = ?ready, "Dispatching file event");
            proc(self, fd, ready);
            processed += 1;

            if let Some(fe) = self.file_events.iter_mut().find(|fe| fe.token == token) {
                fe.proc = Some(proc);
            }

            rfds.remove(fd);
            wfds.remove(fd);
            efds.remove(fd);
            i = 0;
        }

        processed
    }

    fn dispatch_time_events(&mut self) -> usize {
        let mut processed = 0;
        let max_id = self.next_timer_id;
        let mut fired: Vec<TimerId> = Vec::new();
        let mut i = 0;

        while let Some(te) = self.time_events.get(i) {
            let id = te.id;
            if id.0 >= max_id || fired.contains(&id) || te.proc.is_none() {
                i += 1;
                continue;
            }
            if self.clock.now() < te.when {
                i += 1;
                continue;
            }

            let Some(mut proc) = self.time_events[i].proc.take() else {
                i += 1;
                continue;
            };

            trace!(id = id.0, "Dispatching timer");
            fired.push(id);
            let action = proc(self, id);
            processed += 1;

            match action {
                TimerAction::Again(ms) => {
                    let when = self.clock.now().add_millis(ms);
                    if let Some(te) = self.time_events.iter_mut().find(|te| te.id == id) {
                        te.when = when;
                        te.proc = Some(proc);
                    }
                }
                TimerAction::NoMore => {
                    drop(proc);
                    // The callback may already have removed itself
                    if self.time_events.iter().any(|te| te.id == id) {
                        let _ = self.delete_time_event(id);
                    }
                }
            }
            i = 0;
        }

        processed
    }

    /// Processes events until [`stop`](Self::stop) is called.
    ///
    /// A failed pass is logged and the loop carries on.
    pub fn run(&mut self) {
        self.stop = false;
        while !self.stop {
            if let Err(e) = self.process_events(ProcessFlags::ALL_EVENTS) {
                warn!(error = %e, "Event loop pass failed");
            }
        }
    }

    /// Asks [`run`](Self::run) to return after the current pass.
    pub fn stop(&mut self) {
        self.stop = true;
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // Remaining events are released without their finalizers
        self.memory.free(
            self.file_events.len() * mem::size_of::<FileEvent>()
                + self.time_events.len() * mem::size_of::<TimeEvent>(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::time::ManualClock;
    use std::cell::{Cell, RefCell};
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::rc::Rc;

    fn poll() -> ProcessFlags {
        ProcessFlags::ALL_EVENTS | ProcessFlags::DONT_WAIT
    }

    fn manual_loop() -> (EventLoop, ManualClock) {
        let clock = ManualClock::new(When::new(1_000, 0));
        (EventLoop::with_clock(clock.clone()), clock)
    }

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let c = Rc::new(Cell::new(0));
        (c.clone(), c)
    }

    #[test]
    fn test_nothing_requested() {
        let mut el = EventLoop::new();
        assert_eq!(el.process_events(ProcessFlags::DONT_WAIT).unwrap(), 0);
        assert_eq!(el.process_events(ProcessFlags::default()).unwrap(), 0);
    }

    #[test]
    fn test_timer_reschedules_from_fire_time() {
        let (mut el, clock) = manual_loop();
        let start = clock.now();
        let fired = Rc::new(RefCell::new(Vec::new()));

        let log = fired.clone();
        let now = clock.clone();
        el.create_time_event(
            100,
            move |_el: &mut EventLoop, _id| {
                log.borrow_mut().push(now.now());
                TimerAction::Again(50)
            },
            None,
        )
        .unwrap();

        assert_eq!(el.process_events(poll()).unwrap(), 0);

        clock.advance(99);
        assert_eq!(el.process_events(poll()).unwrap(), 0);

        clock.advance(1);
        assert_eq!(el.process_events(poll()).unwrap(), 1);

        clock.advance(49);
        assert_eq!(el.process_events(poll()).unwrap(), 0);

        clock.advance(1);
        assert_eq!(el.process_events(poll()).unwrap(), 1);

        assert_eq!(
            *fired.borrow(),
            vec![start.add_millis(100), start.add_millis(150)]
        );
    }

    #[test]
    fn test_one_shot_timer_finalized_once() {
        let (mut el, clock) = manual_loop();
        let (runs, runs_seen) = counter();
        let (finals, finals_seen) = counter();

        let id = el
            .create_time_event(
                10,
                move |_el: &mut EventLoop, _id| {
                    runs.set(runs.get() + 1);
                    TimerAction::NoMore
                },
                Some(Box::new(move |_el: &mut EventLoop| {
                    finals.set(finals.get() + 1);
                })),
            )
            .unwrap();

        clock.advance(10);
        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(runs_seen.get(), 1);
        assert_eq!(finals_seen.get(), 1);
        assert_eq!(el.time_event_count(), 0);

        // Gone for good
        assert!(matches!(
            el.delete_time_event(id),
            Err(EventError::NotFound(missing)) if missing == id
        ));
        clock.advance(1000);
        assert_eq!(el.process_events(poll()).unwrap(), 0);
        assert_eq!(finals_seen.get(), 1);
    }

    #[test]
    fn test_delete_time_event_runs_finalizer() {
        let (mut el, _clock) = manual_loop();
        let (finals, finals_seen) = counter();

        let id = el
            .create_time_event(
                10,
                |_el: &mut EventLoop, _id| TimerAction::NoMore,
                Some(Box::new(move |_el: &mut EventLoop| {
                    finals.set(finals.get() + 1);
                })),
            )
            .unwrap();

        el.delete_time_event(id).unwrap();
        assert_eq!(finals_seen.get(), 1);
        assert!(el.delete_time_event(id).is_err());
    }

    #[test]
    fn test_timer_ids_increase() {
        let (mut el, _clock) = manual_loop();
        let a = el
            .create_time_event(1, |_: &mut EventLoop, _| TimerAction::NoMore, None)
            .unwrap();
        let b = el
            .create_time_event(1, |_: &mut EventLoop, _| TimerAction::NoMore, None)
            .unwrap();
        assert_eq!(a.as_u64(), 0);
        assert_eq!(b.as_u64(), 1);
    }

    #[test]
    fn test_timer_created_in_callback_waits_for_next_pass() {
        let (mut el, _clock) = manual_loop();
        let (child_runs, child_seen) = counter();

        el.create_time_event(
            0,
            move |el: &mut EventLoop, _id| {
                let child_runs = child_runs.clone();
                el.create_time_event(
                    0,
                    move |_el: &mut EventLoop, _id| {
                        child_runs.set(child_runs.get() + 1);
                        TimerAction::NoMore
                    },
                    None,
                )
                .unwrap();
                TimerAction::NoMore
            },
            None,
        )
        .unwrap();

        // Only the parent runs, although the child is already due
        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(child_seen.get(), 0);

        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(child_seen.get(), 1);
    }

    #[test]
    fn test_zero_delay_reschedule_fires_once_per_pass() {
        let (mut el, _clock) = manual_loop();
        let (runs, runs_seen) = counter();

        el.create_time_event(
            0,
            move |_el: &mut EventLoop, _id| {
                runs.set(runs.get() + 1);
                TimerAction::Again(0)
            },
            None,
        )
        .unwrap();

        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(runs_seen.get(), 2);
    }

    #[test]
    fn test_timer_deletes_another_timer() {
        let (mut el, clock) = manual_loop();
        let (finals, finals_seen) = counter();

        let victim = el
            .create_time_event(
                1000,
                |_el: &mut EventLoop, _id| TimerAction::NoMore,
                Some(Box::new(move |_el: &mut EventLoop| {
                    finals.set(finals.get() + 1);
                })),
            )
            .unwrap();

        el.create_time_event(
            10,
            move |el: &mut EventLoop, _id| {
                el.delete_time_event(victim).unwrap();
                TimerAction::NoMore
            },
            None,
        )
        .unwrap();

        clock.advance(10);
        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(finals_seen.get(), 1);
        assert_eq!(el.time_event_count(), 0);
    }

    #[test]
    fn test_two_ready_fds_both_dispatched() {
        let (mut el, _clock) = manual_loop();
        let (a_read, mut a_write) = UnixStream::pair().unwrap();
        let (b_read, mut b_write) = UnixStream::pair().unwrap();
        a_write.write_all(b"a").unwrap();
        b_write.write_all(b"b").unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        for fd in [a_read.as_raw_fd(), b_read.as_raw_fd()] {
            let seen = seen.clone();
            el.create_file_event(
                fd,
                Mask::READABLE,
                move |_el: &mut EventLoop, fd, mask| {
                    seen.borrow_mut().push((fd, mask));
                },
                None,
            )
            .unwrap();
        }

        let processed = el
            .process_events(ProcessFlags::FILE_EVENTS | ProcessFlags::DONT_WAIT)
            .unwrap();
        assert_eq!(processed, 2);

        let mut seen = seen.borrow().clone();
        seen.sort_by_key(|(fd, _)| *fd);
        let mut expected = vec![
            (a_read.as_raw_fd(), Mask::READABLE),
            (b_read.as_raw_fd(), Mask::READABLE),
        ];
        expected.sort_by_key(|(fd, _)| *fd);
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_idle_fd_not_dispatched() {
        let (mut el, _clock) = manual_loop();
        let (idle, _peer) = UnixStream::pair().unwrap();
        let (runs, runs_seen) = counter();

        el.create_file_event(
            idle.as_raw_fd(),
            Mask::READABLE,
            move |_el: &mut EventLoop, _fd, _mask| runs.set(runs.get() + 1),
            None,
        )
        .unwrap();

        assert_eq!(el.process_events(poll()).unwrap(), 0);
        assert_eq!(runs_seen.get(), 0);
    }

    #[test]
    fn test_ready_mask_is_subset_of_interest() {
        let (mut el, _clock) = manual_loop();
        let (sock, mut peer) = UnixStream::pair().unwrap();
        peer.write_all(b"x").unwrap();

        let got = Rc::new(Cell::new(Mask::NONE));
        let slot = got.clone();
        el.create_file_event(
            sock.as_raw_fd(),
            Mask::READABLE | Mask::WRITABLE,
            move |_el: &mut EventLoop, _fd, mask| slot.set(mask),
            None,
        )
        .unwrap();

        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(got.get(), Mask::READABLE | Mask::WRITABLE);
    }

    #[test]
    fn test_file_callback_removes_itself() {
        let (mut el, _clock) = manual_loop();
        let (sock, mut peer) = UnixStream::pair().unwrap();
        peer.write_all(b"bye").unwrap();
        let (finals, finals_seen) = counter();

        let reader = sock.try_clone().unwrap();
        let mut reader = Some(reader);
        el.create_file_event(
            sock.as_raw_fd(),
            Mask::READABLE,
            move |el: &mut EventLoop, fd, _mask| {
                if let Some(mut r) = reader.take() {
                    let mut buf = [0u8; 8];
                    let _ = r.read(&mut buf).unwrap();
                }
                el.delete_file_event(fd, Mask::READABLE);
            },
            Some(Box::new(move |_el: &mut EventLoop| {
                finals.set(finals.get() + 1);
            })),
        )
        .unwrap();

        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(el.file_event_count(), 0);
        assert_eq!(finals_seen.get(), 1);
    }

    #[test]
    fn test_file_callback_removes_another_ready_event() {
        let (mut el, _clock) = manual_loop();
        let (a, _a_peer) = UnixStream::pair().unwrap();
        let (b, _b_peer) = UnixStream::pair().unwrap();
        let a_fd = a.as_raw_fd();
        let (a_calls, a_calls_seen) = counter();
        let (a_finals, a_finals_seen) = counter();
        let (b_calls, b_calls_seen) = counter();

        // Both sockets are writable straight away
        el.create_file_event(
            a_fd,
            Mask::WRITABLE,
            move |_el: &mut EventLoop, _fd, _mask| {
                a_calls.set(a_calls.get() + 1);
            },
            Some(Box::new(move |_el: &mut EventLoop| {
                a_finals.set(a_finals.get() + 1);
            })),
        )
        .unwrap();

        // Newest first, so this one runs before `a`
        el.create_file_event(
            b.as_raw_fd(),
            Mask::WRITABLE,
            move |el: &mut EventLoop, _fd, _mask| {
                b_calls.set(b_calls.get() + 1);
                el.delete_file_event(a_fd, Mask::WRITABLE);
            },
            None,
        )
        .unwrap();

        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(b_calls_seen.get(), 1);
        assert_eq!(a_calls_seen.get(), 0);
        assert_eq!(a_finals_seen.get(), 1);
        assert_eq!(el.file_event_count(), 1);

        // The next pass only sees the survivor
        assert_eq!(el.process_events(poll()).unwrap(), 1);
        assert_eq!(b_calls_seen.get(), 2);
        assert_eq!(a_calls_seen.get(), 0);
        assert_eq!(a_finals_seen.get(), 1);
    }

    #[test]
    fn test_delete_file_event_matches_mask() {
        let (mut el, _clock) = manual_loop();
        let (sock, _peer) = UnixStream::pair().unwrap();
        let fd = sock.as_raw_fd();

        el.create_file_event(fd, Mask::READABLE, |_: &mut EventLoop, _, _| {}, None)
            .unwrap();
        el.create_file_event(fd, Mask::WRITABLE, |_: &mut EventLoop, _, _| {}, None)
            .unwrap();
        assert_eq!(el.file_event_count(), 2);

        // No event with this exact mask
        el.delete_file_event(fd, Mask::READABLE | Mask::WRITABLE);
        assert_eq!(el.file_event_count(), 2);

        el.delete_file_event(fd, Mask::WRITABLE);
        assert_eq!(el.file_event_count(), 1);
        el.delete_file_event(fd, Mask::READABLE);
        assert_eq!(el.file_event_count(), 0);

        // Absent: no-op
        el.delete_file_event(fd, Mask::READABLE);
    }

    #[test]
    fn test_out_of_range_fd_rejected() {
        let mut el = EventLoop::new();
        let result = el.create_file_event(-1, Mask::READABLE, |_: &mut EventLoop, _, _| {}, None);
        assert!(matches!(result, Err(EventError::FdOutOfRange(-1))));

        let big = libc::FD_SETSIZE as RawFd;
        let result = el.create_file_event(big, Mask::READABLE, |_: &mut EventLoop, _, _| {}, None);
        assert!(matches!(result, Err(EventError::FdOutOfRange(_))));
        assert_eq!(el.file_event_count(), 0);
    }

    #[test]
    fn test_run_until_stopped() {
        let (mut el, _clock) = manual_loop();
        let (ticks, ticks_seen) = counter();

        el.create_time_event(
            0,
            move |el: &mut EventLoop, _id| {
                ticks.set(ticks.get() + 1);
                if ticks.get() % 5 == 0 {
                    el.stop();
                }
                TimerAction::Again(0)
            },
            None,
        )
        .unwrap();

        el.run();
        assert_eq!(ticks_seen.get(), 5);
        assert!(el.is_stopped());

        // The loop is still usable
        el.run();
        assert_eq!(ticks_seen.get(), 10);
    }

    #[test]
    fn test_memory_charged_and_released() {
        let memory = MemoryTracker::new();
        let clock = ManualClock::new(When::new(0, 0));
        let mut el = EventLoop::with_clock_and_memory(clock, memory.clone());

        let id = el
            .create_time_event(10, |_: &mut EventLoop, _| TimerAction::NoMore, None)
            .unwrap();
        el.create_time_event(10, |_: &mut EventLoop, _| TimerAction::NoMore, None)
            .unwrap();
        assert_eq!(memory.used_memory(), 2 * mem::size_of::<TimeEvent>());

        el.delete_time_event(id).unwrap();
        assert_eq!(memory.used_memory(), mem::size_of::<TimeEvent>());

        // Dropping releases the rest without finalizers
        drop(el);
        assert_eq!(memory.used_memory(), 0);
    }

    #[test]
    fn test_memory_limit_refuses_events() {
        let mut el = EventLoop::with_memory(MemoryTracker::with_limit(0));

        let result = el.create_time_event(10, |_: &mut EventLoop, _| TimerAction::NoMore, None);
        assert!(matches!(result, Err(EventError::OutOfMemory(_))));
        assert_eq!(el.time_event_count(), 0);
    }

    #[test]
    fn test_drop_skips_finalizers() {
        let (finals, finals_seen) = counter();
        {
            let (mut el, _clock) = manual_loop();
            el.create_time_event(
                10,
                |_: &mut EventLoop, _| TimerAction::NoMore,
                Some(Box::new(move |_el: &mut EventLoop| {
                    finals.set(finals.get() + 1);
                })),
            )
            .unwrap();
        }
        assert_eq!(finals_seen.get(), 0);
    }
}
