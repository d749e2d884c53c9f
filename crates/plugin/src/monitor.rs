//! Card insertion and removal monitoring
//!
//! Waits are blocking loops made of bounded native waits so that another thread can
//! stop them between two cycles. Each reader tracks where it stands in a
//! [`MonitorState`]:
//!
//! ```text
//! Idle --wait insertion--> AwaitingInsertion --card--> CardPresent
//!                                 |--stopped--> Idle
//! CardPresent --wait removal--> AwaitingRemoval --removed--> Idle
//!                                 |--stopped--> CardPresent
//! any wait --error--> Idle
//! ```

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::{
    config::DisconnectionMode,
    error::{Error, Result, WaitTask},
};

/// Pause between two presence probes when polling for removal
pub const PROBE_INTERVAL: Duration = Duration::from_millis(25);

/// Monitoring state of a reader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, derive_more::Display)]
pub enum MonitorState {
    /// No wait in progress and no card known to be present
    #[default]
    Idle,
    /// Blocked waiting for a card
    AwaitingInsertion,
    /// A card was detected and no removal wait is running
    CardPresent,
    /// Blocked waiting for the card to leave
    AwaitingRemoval,
}

/// How card removal is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalStrategy {
    /// Native absence wait, bounded by the monitoring cycle
    Standard,
    /// Repeated presence probes; the first I/O failure means the card is gone
    ///
    /// Needed once the card is unpowered on disconnection: the middleware would
    /// otherwise report a card that is still physically there.
    Polling,
}

impl RemovalStrategy {
    /// Strategy matching the disposition applied when sessions close
    pub const fn for_mode(mode: DisconnectionMode) -> Self {
        match mode {
            DisconnectionMode::Unpower => Self::Polling,
            _ => Self::Standard,
        }
    }
}

/// Card presence primitives the wait loops are built on
pub(crate) trait PresenceSource {
    /// One bounded native wait for a card; `true` once present
    fn wait_for_card_present(&self, timeout: Duration) -> Result<bool>;

    /// One bounded native wait for the card to leave; `true` once absent
    fn wait_for_card_absent(&self, timeout: Duration) -> Result<bool>;

    /// Exchange a harmless command with the card
    fn probe(&self) -> Result<()>;

    /// Release the card once a removal wait ends, whatever the outcome
    fn finalize(&self) -> Result<()>;
}

/// Wait flags and monitoring state of one reader
#[derive(Debug)]
pub struct ReaderMonitor {
    reader: String,
    cycle: Duration,
    waiting_insertion: AtomicBool,
    waiting_removal: AtomicBool,
    observation: AtomicBool,
    state: Mutex<MonitorState>,
}

impl ReaderMonitor {
    /// Idle monitor; `cycle` bounds every native wait
    pub fn new(reader: impl Into<String>, cycle: Duration) -> Self {
        Self {
            reader: reader.into(),
            cycle,
            waiting_insertion: AtomicBool::new(false),
            waiting_removal: AtomicBool::new(false),
            observation: AtomicBool::new(false),
            state: Mutex::new(MonitorState::Idle),
        }
    }

    /// Current monitoring state
    pub fn state(&self) -> MonitorState {
        *self.state.lock()
    }

    /// Timeout of one native wait
    pub const fn cycle(&self) -> Duration {
        self.cycle
    }

    /// Whether a host is observing card processing on this reader
    pub fn is_observation_active(&self) -> bool {
        self.observation.load(Ordering::SeqCst)
    }

    pub(crate) fn set_observation_active(&self, active: bool) {
        self.observation.store(active, Ordering::SeqCst);
    }

    /// Whether an insertion wait is running
    pub fn is_waiting_for_insertion(&self) -> bool {
        self.waiting_insertion.load(Ordering::SeqCst)
    }

    /// Whether a removal wait is running
    pub fn is_waiting_for_removal(&self) -> bool {
        self.waiting_removal.load(Ordering::SeqCst)
    }

    /// Make a running insertion wait return at the end of its current cycle
    pub fn stop_insertion_wait(&self) {
        self.waiting_insertion.store(false, Ordering::SeqCst);
    }

    /// Make a running removal wait return at the end of its current cycle
    pub fn stop_removal_wait(&self) {
        self.waiting_removal.store(false, Ordering::SeqCst);
    }

    fn set_state(&self, state: MonitorState) {
        let mut current = self.state.lock();
        let previous = *current;
        if previous != state {
            trace!(reader = %self.reader, from = %previous, to = %state, "Monitor state change");
            *current = state;
        }
    }

    /// Block until a card is present
    pub(crate) fn wait_for_insertion<S>(&self, source: &S) -> Result<()>
    where
        S: PresenceSource + ?Sized,
    {
        trace!(
            reader = %self.reader,
            cycle_ms = self.cycle.as_millis() as u64,
            "Start waiting card insertion"
        );
        self.waiting_insertion.store(true, Ordering::SeqCst);
        self.set_state(MonitorState::AwaitingInsertion);

        let outcome = self.insertion_loop(source);
        self.waiting_insertion.store(false, Ordering::SeqCst);

        match outcome {
            Ok(true) => {
                trace!(reader = %self.reader, "Card inserted");
                self.set_state(MonitorState::CardPresent);
                Ok(())
            }
            Ok(false) => {
                trace!(reader = %self.reader, "Waiting card insertion stopped");
                self.set_state(MonitorState::Idle);
                Err(self.canceled(WaitTask::CardInsertion))
            }
            Err(e) => {
                self.set_state(MonitorState::Idle);
                Err(e)
            }
        }
    }

    fn insertion_loop<S>(&self, source: &S) -> Result<bool>
    where
        S: PresenceSource + ?Sized,
    {
        while self.is_waiting_for_insertion() {
            if source.wait_for_card_present(self.cycle)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Block until the card is removed
    ///
    /// The card is released through [`PresenceSource::finalize`] whatever the
    /// outcome; a release failure is only logged.
    pub(crate) fn wait_for_removal<S>(&self, source: &S, strategy: RemovalStrategy) -> Result<()>
    where
        S: PresenceSource + ?Sized,
    {
        trace!(reader = %self.reader, ?strategy, "Start waiting card removal");
        self.waiting_removal.store(true, Ordering::SeqCst);
        self.set_state(MonitorState::AwaitingRemoval);

        let outcome = match strategy {
            RemovalStrategy::Standard => self.removal_loop(source),
            RemovalStrategy::Polling => self.polling_loop(source),
        };
        self.waiting_removal.store(false, Ordering::SeqCst);

        if let Err(e) = source.finalize() {
            warn!(reader = %self.reader, error = %e, "Error while disconnecting card during card removal");
        }

        match outcome {
            Ok(true) => {
                trace!(reader = %self.reader, "Card removed");
                self.set_state(MonitorState::Idle);
                Ok(())
            }
            Ok(false) => {
                trace!(reader = %self.reader, "Waiting card removal stopped");
                self.set_state(MonitorState::CardPresent);
                Err(self.canceled(WaitTask::CardRemoval))
            }
            Err(e) => {
                self.set_state(MonitorState::Idle);
                Err(e)
            }
        }
    }

    fn removal_loop<S>(&self, source: &S) -> Result<bool>
    where
        S: PresenceSource + ?Sized,
    {
        while self.is_waiting_for_removal() {
            if source.wait_for_card_absent(self.cycle)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn polling_loop<S>(&self, source: &S) -> Result<bool>
    where
        S: PresenceSource + ?Sized,
    {
        while self.is_waiting_for_removal() {
            match source.probe() {
                Ok(()) => thread::sleep(PROBE_INTERVAL),
                Err(e) if e.is_io() => {
                    trace!(reader = %self.reader, error = %e, "Probe failed, card is gone");
                    return Ok(true);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    fn canceled(&self, task: WaitTask) -> Error {
        Error::TaskCanceled {
            reader: self.reader.clone(),
            task,
        }
    }
}
