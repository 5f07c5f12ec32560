//! Single-flight guard for claim disbursement.
//!
//! A claim walks `Idle -> Settling -> Zeroing -> Paying -> Idle`. While one
//! claim is anywhere past `Idle`, no other claim on the same ledger may enter
//! `Settling`. The guard is global to the ledger instance, not per rig.
//!
//! [`FlightGuard`] owns its own handle to the phase token rather than a borrow
//! of the ledger, so the claim can keep mutating the ledger (and hand it to
//! the payout sink) while the guard is held. Dropping the guard returns the
//! token to `Idle` on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClaimPhase {
    Idle = 0,
    Settling = 1,
    Zeroing = 2,
    Paying = 3,
}

impl ClaimPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Settling,
            2 => Self::Zeroing,
            3 => Self::Paying,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Default)]
pub struct SingleFlight {
    phase: Arc<AtomicU8>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ClaimPhase {
        ClaimPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move `Idle -> Settling`, or fail with [`LedgerError::ReentrantCall`].
    pub fn enter(&self) -> Result<FlightGuard, LedgerError> {
        self.phase
            .compare_exchange(
                ClaimPhase::Idle as u8,
                ClaimPhase::Settling as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| LedgerError::ReentrantCall)?;
        Ok(FlightGuard {
            phase: Arc::clone(&self.phase),
        })
    }
}

/// Proof that a claim is in flight. Releases the token on drop.
#[derive(Debug)]
pub struct FlightGuard {
    phase: Arc<AtomicU8>,
}

impl FlightGuard {
    pub fn advance(&self, phase: ClaimPhase) {
        debug_assert!(phase != ClaimPhase::Idle);
        self.phase.store(phase as u8, Ordering::Release);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.phase.store(ClaimPhase::Idle as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        assert_eq!(SingleFlight::new().phase(), ClaimPhase::Idle);
    }

    #[test]
    fn second_entry_is_reentrant() {
        let flight = SingleFlight::new();
        let guard = flight.enter().unwrap();
        assert_eq!(flight.phase(), ClaimPhase::Settling);
        assert_eq!(flight.enter().unwrap_err(), LedgerError::ReentrantCall);
        guard.advance(ClaimPhase::Paying);
        assert_eq!(flight.enter().unwrap_err(), LedgerError::ReentrantCall);
        drop(guard);
        assert_eq!(flight.phase(), ClaimPhase::Idle);
        assert!(flight.enter().is_ok());
    }

    #[test]
    fn phases_advance() {
        let flight = SingleFlight::new();
        let guard = flight.enter().unwrap();
        guard.advance(ClaimPhase::Zeroing);
        assert_eq!(flight.phase(), ClaimPhase::Zeroing);
        guard.advance(ClaimPhase::Paying);
        assert_eq!(flight.phase(), ClaimPhase::Paying);
    }

    #[test]
    fn released_on_error_path() {
        let flight = SingleFlight::new();
        let attempt = || -> Result<(), LedgerError> {
            let _guard = flight.enter()?;
            Err(LedgerError::NoRewards)
        };
        assert_eq!(attempt().unwrap_err(), LedgerError::NoRewards);
        assert_eq!(flight.phase(), ClaimPhase::Idle);
    }
}
