//! Validation side-record kept by a block for library introspection
//!
//! Timing is not part of the record. Callers that want stage timestamps
//! attach an `Instrument`, for example a `StageClock`.

use crate::chain_state::ChainState;
use crate::error::{Code, ConsensusError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Deserialize,
    Check,
    Accept,
    Connect,
}

/// Receives a notification as each pipeline stage starts.
pub trait Instrument: Send + Sync {
    fn stage_started(&self, stage: Stage);
}

/// Records the start instant of each stage.
#[derive(Debug, Default)]
pub struct StageClock {
    starts: Mutex<Vec<(Stage, Instant)>>,
}

impl StageClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent start of `stage`.
    pub fn started(&self, stage: Stage) -> Option<Instant> {
        self.starts
            .lock()
            .iter()
            .rev()
            .find(|(recorded, _)| *recorded == stage)
            .map(|(_, instant)| *instant)
    }

    /// Stages in the order they started.
    pub fn stages(&self) -> Vec<Stage> {
        self.starts.lock().iter().map(|(stage, _)| *stage).collect()
    }
}

impl Instrument for StageClock {
    fn stage_started(&self, stage: Stage) {
        self.starts.lock().push((stage, Instant::now()));
    }
}

pub struct Validation {
    /// Identifier of the peer or component the block came from.
    pub originator: u64,
    /// Validate without committing the block to the chain.
    pub simulate: bool,
    result: Mutex<Code>,
    state: Mutex<Option<Arc<ChainState>>>,
    instrument: Option<Arc<dyn Instrument>>,
}

impl Validation {
    pub fn new() -> Self {
        Validation {
            originator: 0,
            simulate: false,
            result: Mutex::new(Err(ConsensusError::NotFound)),
            state: Mutex::new(None),
            instrument: None,
        }
    }

    /// Result of the most recent stage; `NotFound` before any ran.
    pub fn result(&self) -> Code {
        self.result.lock().clone()
    }

    /// Chain state used by the most recent contextual stage.
    pub fn state(&self) -> Option<Arc<ChainState>> {
        self.state.lock().clone()
    }

    pub fn set_instrument(&mut self, instrument: Arc<dyn Instrument>) {
        self.instrument = Some(instrument);
    }

    pub fn instrument(&self) -> Option<&Arc<dyn Instrument>> {
        self.instrument.as_ref()
    }

    pub(crate) fn start(&self, stage: Stage) {
        if let Some(instrument) = &self.instrument {
            instrument.stage_started(stage);
        }
    }

    pub(crate) fn record(&self, result: Code, state: Option<Arc<ChainState>>) -> Code {
        *self.result.lock() = result.clone();
        if state.is_some() {
            *self.state.lock() = state;
        }
        result
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Validation {
    fn clone(&self) -> Self {
        Validation {
            originator: self.originator,
            simulate: self.simulate,
            result: Mutex::new(self.result()),
            state: Mutex::new(self.state()),
            instrument: self.instrument.clone(),
        }
    }
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validation")
            .field("originator", &self.originator)
            .field("simulate", &self.simulate)
            .field("result", &self.result())
            .field("state", &self.state())
            .field("instrumented", &self.instrument.is_some())
            .finish()
    }
}
