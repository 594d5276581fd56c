//! Load sequencing for bidsync.
//!
//! Every load (bootstrap or silent refresh) mints a new generation. Results
//! produced by an older generation are still awaited by their task but are
//! never committed: the sequencer never cancels, it only gates.

use std::sync::atomic::{AtomicU64, Ordering};

use sync_types::Generation;

/// Why a load was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// First load: blocks the board, failures are fatal.
    Bootstrap,
    /// Background refresh: existing state stays visible, failures are warnings.
    SilentRefresh,
}

impl LoadMode {
    /// Whether failures in this mode are fatal for the load.
    pub fn is_bootstrap(&self) -> bool {
        matches!(self, Self::Bootstrap)
    }
}

/// Token held by one load; compared against the live counter before commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationToken {
    generation: Generation,
    mode: LoadMode,
}

impl GenerationToken {
    /// The generation this token was minted for.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The mode the load was started in.
    pub fn mode(&self) -> LoadMode {
        self.mode
    }
}

/// Outcome of offering a result for commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// The token is current; the result may be applied.
    Applied,
    /// A newer load has started; the result is dropped.
    Stale,
}

/// Monotonic generation counter owned by one controller.
#[derive(Debug, Default)]
pub struct LoadSequencer {
    current: AtomicU64,
}

impl LoadSequencer {
    /// Create a sequencer at generation zero (no load started).
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new load. Every previously issued token becomes stale.
    pub fn begin_load(&self, mode: LoadMode) -> GenerationToken {
        let value = self.current.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        GenerationToken {
            generation: Generation::new(value),
            mode,
        }
    }

    /// Whether the token belongs to the most recent load.
    pub fn is_current(&self, token: &GenerationToken) -> bool {
        self.current.load(Ordering::SeqCst) == token.generation.value()
    }

    /// Gate a commit on the token being current.
    pub fn check(&self, token: &GenerationToken) -> Commit {
        if self.is_current(token) {
            Commit::Applied
        } else {
            Commit::Stale
        }
    }

    /// The live generation.
    pub fn current(&self) -> Generation {
        Generation::new(self.current.load(Ordering::SeqCst))
    }
}
