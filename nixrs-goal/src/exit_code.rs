/// A goal's terminal state.
///
/// Mirrors `Goal::ExitCode` from the C++ worker: every goal settles into
/// exactly one of these once its coroutine returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExitCode {
    Busy,
    Success,
    Failed,
    NoSubstituters,
    IncompleteClosure,
}

impl ExitCode {
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

/// Accumulates the exit codes of a set of awaited sub-goals, the way
/// `Goal::await()` folds `nrFailed`/`nrNoSubstituters`/`nrIncompleteClosure`
/// counters over the goals it waited on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitTally {
    pub n_failed: u64,
    pub n_no_substituters: u64,
    pub n_incomplete_closure: u64,
}

impl ExitTally {
    pub fn record(&mut self, code: ExitCode) {
        match code {
            ExitCode::Failed => self.n_failed += 1,
            ExitCode::NoSubstituters => self.n_no_substituters += 1,
            ExitCode::IncompleteClosure => self.n_incomplete_closure += 1,
            ExitCode::Busy | ExitCode::Success => {}
        }
    }

    /// The same precedence the worker uses when turning per-goal tallies
    /// into a single summarising code for the parent.
    pub fn overall(&self) -> ExitCode {
        if self.n_failed > 0 {
            ExitCode::Failed
        } else if self.n_incomplete_closure > 0 {
            ExitCode::IncompleteClosure
        } else if self.n_no_substituters > 0 {
            ExitCode::NoSubstituters
        } else {
            ExitCode::Success
        }
    }
}
