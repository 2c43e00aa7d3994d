use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a tracking processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// `start` has not been called yet.
    NotStarted,
    /// Workers are processing segments.
    Started,
    /// Processing suspended by `pause`; `start` resumes it.
    Paused,
    /// A worker hit an unrecoverable failure and processing stopped.
    PausedError,
    /// Terminal state for this lifecycle.
    ShutDown,
}

impl ProcessorState {
    /// Whether processing loops may keep running.
    pub fn is_running(self) -> bool {
        matches!(self, ProcessorState::Started)
    }

    fn as_u8(self) -> u8 {
        match self {
            ProcessorState::NotStarted => 0,
            ProcessorState::Started => 1,
            ProcessorState::Paused => 2,
            ProcessorState::PausedError => 3,
            ProcessorState::ShutDown => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ProcessorState::NotStarted,
            1 => ProcessorState::Started,
            2 => ProcessorState::Paused,
            3 => ProcessorState::PausedError,
            _ => ProcessorState::ShutDown,
        }
    }
}

/// Atomic cell holding the processor state. Every worker loop reads it
/// at the loop head and at each sleep slice.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: ProcessorState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub(crate) fn load(&self) -> ProcessorState {
        ProcessorState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: ProcessorState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn swap(&self, state: ProcessorState) -> ProcessorState {
        ProcessorState::from_u8(self.0.swap(state.as_u8(), Ordering::SeqCst))
    }

    /// Applies `transition` atomically, returning the previous state.
    pub(crate) fn update(
        &self,
        transition: impl Fn(ProcessorState) -> ProcessorState,
    ) -> ProcessorState {
        loop {
            let current = self.0.load(Ordering::SeqCst);
            let next = transition(ProcessorState::from_u8(current)).as_u8();
            if self
                .0
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return ProcessorState::from_u8(current);
            }
        }
    }
}
