//! Allocation fault simulator
//!
//! Lets tests force the N-th fallible allocation to fail, the way SQLite's
//! test harness drives `sqlite3_test_control(SQLITE_TESTCTRL_FAULT_INSTALL)`.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct FaultState {
    /// Allocations still allowed to succeed before faults begin
    countdown: u32,
    /// Faults left to inject once the countdown has expired
    repeat: u32,
    /// Faults injected since the simulator was last armed
    injected: u32,
}

/// Fault-injection switch for one allocator
#[derive(Debug, Default)]
pub struct FaultSim {
    state: Mutex<FaultState>,
}

impl FaultSim {
    /// Create a disarmed simulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `delay` allocations succeed, then fail the next `repeat`.
    pub fn arm(&self, delay: u32, repeat: u32) {
        let mut st = self.state.lock();
        st.countdown = delay;
        st.repeat = repeat;
        st.injected = 0;
    }

    /// Stop injecting faults
    pub fn disarm(&self) {
        let mut st = self.state.lock();
        st.countdown = 0;
        st.repeat = 0;
    }

    /// Is a fault still pending?
    pub fn is_armed(&self) -> bool {
        self.state.lock().repeat > 0
    }

    /// Number of faults injected since the last `arm`
    pub fn injected(&self) -> u32 {
        self.state.lock().injected
    }

    /// Consult the simulator for one allocation. Returns true to fail it.
    pub(crate) fn should_fail(&self) -> bool {
        let mut st = self.state.lock();
        if st.repeat == 0 {
            return false;
        }
        if st.countdown > 0 {
            st.countdown -= 1;
            return false;
        }
        st.repeat -= 1;
        st.injected += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disarmed_never_fails() {
        let sim = FaultSim::new();
        assert!(!sim.should_fail());
        assert!(!sim.is_armed());
    }

    #[test]
    fn test_delay_then_repeat() {
        let sim = FaultSim::new();
        sim.arm(2, 2);
        assert!(!sim.should_fail());
        assert!(!sim.should_fail());
        assert!(sim.should_fail());
        assert!(sim.should_fail());
        assert!(!sim.should_fail());
        assert_eq!(sim.injected(), 2);
    }

    #[test]
    fn test_disarm() {
        let sim = FaultSim::new();
        sim.arm(0, 5);
        sim.disarm();
        assert!(!sim.should_fail());
    }
}
