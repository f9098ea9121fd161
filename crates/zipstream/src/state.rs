//! Stream lifecycle state and the scoped transition guard.

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// Constructed, processor not yet initialized
    Idle = 0,
    /// Accepting writes
    Data = 1,
    /// End of stream reached, only close/destroy remain
    Eos = 2,
    /// A previous operation failed
    Error = 3,
    /// Processor torn down
    Destroyed = 4,
}

impl State {
    /// Convert from u8
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Data,
            2 => Self::Eos,
            4 => Self::Destroyed,
            _ => Self::Error,
        }
    }

    /// Check if close/destroy have nothing left to tear down
    pub fn is_idle(&self) -> bool {
        matches!(self, State::Idle | State::Destroyed)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "idle"),
            State::Data => write!(f, "data"),
            State::Eos => write!(f, "eos"),
            State::Error => write!(f, "error"),
            State::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Guard that writes a failure state on drop unless resolved.
///
/// Every early return (including `?` and unwinding) leaves the state at
/// `failure`. Success has to be committed explicitly.
pub(crate) struct Transition<'a> {
    state: &'a mut State,
    failure: State,
    armed: bool,
}

impl<'a> Transition<'a> {
    pub(crate) fn new(state: &'a mut State, failure: State) -> Self {
        Self {
            state,
            failure,
            armed: true,
        }
    }

    /// Set the final state and disarm.
    pub(crate) fn commit(mut self, next: State) {
        *self.state = next;
        self.armed = false;
    }

    /// Disarm, leaving the state untouched.
    pub(crate) fn abort(mut self) {
        self.armed = false;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state = self.failure;
        }
    }
}
