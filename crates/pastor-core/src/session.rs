/// Where the request lifecycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Awaiting,
}

/// Input field contents plus the single-flight busy flag
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub pending_input: String,
    busy: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn phase(&self) -> Phase {
        if self.busy {
            Phase::Awaiting
        } else {
            Phase::Idle
        }
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }
}
