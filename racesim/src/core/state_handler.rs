use serde::{Deserialize, Serialize};

/// Lifecycle of a competitor. Exactly one state is active at a time; Retired and Finished are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    OnTrack,
    PitEntry,
    InPit,
    CrashedOnTrack,
    Retired,
    Finished,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::OnTrack => "on_track",
            State::PitEntry => "pit_entry",
            State::InPit => "in_pit",
            State::CrashedOnTrack => "crashed_on_track",
            State::Retired => "retired",
            State::Finished => "finished",
        }
    }
}

/// Why a competitor is in the pit lane. A wear stop mounts fresh tyres, a repair stop keeps the
/// current (crash damaged) tyres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitReason {
    Wear,
    Repair,
}

/// StateHandler owns the lifecycle state and the pit bookkeeping of one competitor. All
/// transitions go through its methods; a transition requested from the wrong state is ignored
/// (and logged) instead of corrupting the state.
#[derive(Debug, Clone)]
pub struct StateHandler {
    state: State,
    pit_reason: Option<PitReason>,
    entry_ticks_remaining: u32,
    stall_ticks_remaining: u32,
    // stall ticks that will be applied when the pit entry is completed
    planned_stall_ticks: u32,
}

impl StateHandler {
    pub fn get_state(&self) -> State {
        self.state
    }

    pub fn get_pit_reason(&self) -> Option<PitReason> {
        self.pit_reason
    }

    pub fn is_retired(&self) -> bool {
        self.state == State::Retired
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// is_terminal returns true for retired and finished competitors. They are excluded from all
    /// further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, State::Retired | State::Finished)
    }

    pub fn is_stalled(&self) -> bool {
        self.state == State::CrashedOnTrack
    }

    pub fn get_stall_ticks_remaining(&self) -> u32 {
        self.stall_ticks_remaining
    }

    /// get_pit_ticks_remaining returns the remaining ticks of the current pit phase (entry or
    /// stall), 0 outside the pit lane.
    pub fn get_pit_ticks_remaining(&self) -> u32 {
        match self.state {
            State::PitEntry => self.entry_ticks_remaining,
            State::InPit => self.stall_ticks_remaining,
            _ => 0,
        }
    }

    /// act_pit_entry sends an on-track competitor into the pit lane.
    pub fn act_pit_entry(&mut self, reason: PitReason, entry_ticks: u32, stall_ticks: u32) {
        if self.state != State::OnTrack {
            log::warn!("Ignoring pit entry requested in state {}", self.state.as_str());
            return;
        }

        self.state = State::PitEntry;
        self.pit_reason = Some(reason);
        self.entry_ticks_remaining = entry_ticks;
        self.planned_stall_ticks = stall_ticks;
    }

    /// tick_pit_entry counts down the pit entry. Returns true if the competitor reached the stall
    /// in this tick, i.e. is now in the pit.
    pub fn tick_pit_entry(&mut self) -> bool {
        if self.state != State::PitEntry {
            log::warn!("Ignoring pit entry tick in state {}", self.state.as_str());
            return false;
        }

        self.entry_ticks_remaining = self.entry_ticks_remaining.saturating_sub(1);

        if self.entry_ticks_remaining == 0 {
            self.state = State::InPit;
            self.stall_ticks_remaining = self.planned_stall_ticks;
            self.planned_stall_ticks = 0;
            true
        } else {
            false
        }
    }

    /// tick_pit_stall counts down the pit stall. Returns the reason of the finished stop if the
    /// competitor leaves the pit in this tick. The reason is cleared on exit.
    pub fn tick_pit_stall(&mut self) -> Option<PitReason> {
        if self.state != State::InPit {
            log::warn!("Ignoring pit stall tick in state {}", self.state.as_str());
            return None;
        }

        self.stall_ticks_remaining = self.stall_ticks_remaining.saturating_sub(1);

        if self.stall_ticks_remaining == 0 {
            self.state = State::OnTrack;
            // repair stops are always set with a reason, wear is the neutral fallback
            Some(self.pit_reason.take().unwrap_or(PitReason::Wear))
        } else {
            None
        }
    }

    /// act_crashed stops an on-track competitor after a minor crash.
    pub fn act_crashed(&mut self) {
        if self.state != State::OnTrack {
            log::warn!("Ignoring crash stall requested in state {}", self.state.as_str());
            return;
        }
        self.state = State::CrashedOnTrack;
    }

    /// recover puts a stalled competitor back on track.
    pub fn recover(&mut self) {
        if self.state != State::CrashedOnTrack {
            log::warn!("Ignoring recovery requested in state {}", self.state.as_str());
            return;
        }
        self.state = State::OnTrack;
    }

    /// retire is terminal. Pit bookkeeping is cleared so that a retired competitor can never be
    /// reported as being in the pit.
    pub fn retire(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.state = State::Retired;
        self.clear_pit();
    }

    /// finish is terminal.
    pub fn finish(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.state = State::Finished;
        self.clear_pit();
    }

    fn clear_pit(&mut self) {
        self.pit_reason = None;
        self.entry_ticks_remaining = 0;
        self.stall_ticks_remaining = 0;
        self.planned_stall_ticks = 0;
    }
}

impl Default for StateHandler {
    fn default() -> Self {
        StateHandler {
            state: State::OnTrack,
            pit_reason: None,
            entry_ticks_remaining: 0,
            stall_ticks_remaining: 0,
            planned_stall_ticks: 0,
        }
    }
}
