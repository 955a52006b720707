//! The ESS control-timeout state machine.
//!
//! Grounded on the source's implicit
//! "controller crashed mid-command" safety net; the source itself has no
//! direct equivalent beyond the unconditional `CONTROL_TIMEOUT` constant
//! referenced by `dbus-acsystem.py`.

use crate::config::CONTROL_TIMEOUT;

/// Remaining seconds until ESS control is forcibly released. `-1` is Idle,
/// `0` is Expiring (the tick that must drive setpoints to zero), positive
/// is Armed.
#[derive(Debug, Clone, Copy)]
pub struct ControlTimeout {
    remaining: i16,
}

/// What a 1 Hz tick did to the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutEvent {
    /// Still idle, or just returned to idle from Expiring.
    Idle,
    /// Counting down, nothing to do yet.
    Armed,
    /// Transitioned to 0 this tick: the caller must zero every ESS setpoint.
    JustExpired,
}

impl ControlTimeout {
    pub fn new() -> Self {
        Self { remaining: -1 }
    }

    /// Any write to `DisableFeedIn`, `AcPowerSetpoint`, or
    /// `InverterPowerSetpoint` re-arms the timeout.
    pub fn reset(&mut self) {
        self.remaining = i16::from(CONTROL_TIMEOUT);
    }

    pub fn remaining(&self) -> i16 {
        self.remaining
    }

    pub fn is_idle(&self) -> bool {
        self.remaining == -1
    }

    /// Advance one second.
    pub fn tick(&mut self) -> TimeoutEvent {
        match self.remaining {
            -1 => TimeoutEvent::Idle,
            0 => {
                self.remaining = -1;
                TimeoutEvent::Idle
            }
            n => {
                self.remaining = n - 1;
                if self.remaining == 0 {
                    TimeoutEvent::JustExpired
                } else {
                    TimeoutEvent::Armed
                }
            }
        }
    }
}

impl Default for ControlTimeout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let t = ControlTimeout::new();
        assert!(t.is_idle());
    }

    #[test]
    fn reset_arms_to_control_timeout() {
        let mut t = ControlTimeout::new();
        t.reset();
        assert_eq!(t.remaining(), i16::from(CONTROL_TIMEOUT));
    }

    #[test]
    fn sixty_ticks_without_reset_expires_then_idles() {
        let mut t = ControlTimeout::new();
        t.reset();
        let mut last = TimeoutEvent::Armed;
        for _ in 0..i16::from(CONTROL_TIMEOUT) {
            last = t.tick();
        }
        assert_eq!(last, TimeoutEvent::JustExpired);
        assert_eq!(t.remaining(), 0);
        assert_eq!(t.tick(), TimeoutEvent::Idle);
        assert!(t.is_idle());
    }

    #[test]
    fn idle_stays_idle_without_reset() {
        let mut t = ControlTimeout::new();
        assert_eq!(t.tick(), TimeoutEvent::Idle);
        assert_eq!(t.tick(), TimeoutEvent::Idle);
    }
}
