//! Timelocked Parameter Changes
//!
//! Two-phase admin changes: an action is scheduled with an `execute_after`
//! timestamp and can only be taken for execution once the clock reaches it.
//! Pending actions are keyed by a deterministic Blake3 id so the same
//! action cannot be queued twice for the same time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{MarketError, MarketResult};
use crate::types::{Address, AssetId};

const ACTION_ID_DOMAIN: &[u8] = b"LAUNCHPAD_TIMELOCK_ACTION_V1";

/// Parameter change that must wait out the timelock delay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelockedAction {
    /// Curve trading fee in basis points
    SetTradingFee { fee_bps: u16 },
    /// Creator's share of the curve trading fee, in basis points of the fee
    SetCreatorFeeShare { share_bps: u16 },
    /// Recipient of the treasury fee share
    SetTreasury { treasury: Address },
    /// Graduation threshold for one active market
    SetGraduationThreshold { asset_id: AssetId, threshold: u128 },
    /// Minimum delay between scheduling and execution
    SetMinDelay { seconds: u64 },
}

impl TimelockedAction {
    /// Deterministic identifier for this action at `execute_after`.
    pub fn action_id(&self, execute_after: u64) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ACTION_ID_DOMAIN);
        match self {
            TimelockedAction::SetTradingFee { fee_bps } => {
                hasher.update(&[0u8]);
                hasher.update(&fee_bps.to_be_bytes());
            }
            TimelockedAction::SetCreatorFeeShare { share_bps } => {
                hasher.update(&[1u8]);
                hasher.update(&share_bps.to_be_bytes());
            }
            TimelockedAction::SetTreasury { treasury } => {
                hasher.update(&[2u8]);
                hasher.update(treasury);
            }
            TimelockedAction::SetGraduationThreshold { asset_id, threshold } => {
                hasher.update(&[3u8]);
                hasher.update(asset_id);
                hasher.update(&threshold.to_be_bytes());
            }
            TimelockedAction::SetMinDelay { seconds } => {
                hasher.update(&[4u8]);
                hasher.update(&seconds.to_be_bytes());
            }
        }
        hasher.update(&execute_after.to_be_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// A queued action awaiting its execution time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub id: [u8; 32],
    pub action: TimelockedAction,
    pub scheduled_at: u64,
    pub execute_after: u64,
}

impl ScheduledAction {
    pub fn is_ready(&self, now: u64) -> bool {
        now >= self.execute_after
    }
}

/// Pending-actions table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timelock {
    min_delay: u64,
    pending: BTreeMap<[u8; 32], ScheduledAction>,
}

impl Timelock {
    pub fn new(min_delay: u64) -> Self {
        Self {
            min_delay,
            pending: BTreeMap::new(),
        }
    }

    pub fn min_delay(&self) -> u64 {
        self.min_delay
    }

    pub(crate) fn set_min_delay(&mut self, seconds: u64) {
        self.min_delay = seconds;
    }

    /// Queue `action` for execution at or after `execute_after`.
    ///
    /// Returns the action id needed to execute or cancel it.
    pub fn schedule(
        &mut self,
        action: TimelockedAction,
        now: u64,
        execute_after: u64,
    ) -> MarketResult<[u8; 32]> {
        let earliest = now.saturating_add(self.min_delay);
        if execute_after < earliest {
            return Err(MarketError::InvalidParameters(format!(
                "execute_after {} is before earliest allowed {}",
                execute_after, earliest
            )));
        }

        let id = action.action_id(execute_after);
        if self.pending.contains_key(&id) {
            return Err(MarketError::ActionAlreadyScheduled(hex::encode(id)));
        }

        self.pending.insert(
            id,
            ScheduledAction {
                id,
                action,
                scheduled_at: now,
                execute_after,
            },
        );
        Ok(id)
    }

    /// Remove and return a ready action. Fails until `now >= execute_after`.
    pub fn take_ready(&mut self, id: &[u8; 32], now: u64) -> MarketResult<ScheduledAction> {
        let scheduled = self
            .pending
            .get(id)
            .ok_or_else(|| MarketError::UnknownAction(hex::encode(id)))?;

        if !scheduled.is_ready(now) {
            return Err(MarketError::TimelockNotReady {
                execute_after: scheduled.execute_after,
                now,
            });
        }

        self.pending
            .remove(id)
            .ok_or_else(|| MarketError::UnknownAction(hex::encode(id)))
    }

    /// Drop a pending action without executing it.
    pub fn cancel(&mut self, id: &[u8; 32]) -> MarketResult<ScheduledAction> {
        self.pending
            .remove(id)
            .ok_or_else(|| MarketError::UnknownAction(hex::encode(id)))
    }

    pub fn get(&self, id: &[u8; 32]) -> Option<&ScheduledAction> {
        self.pending.get(id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduledAction> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_fails_before_time() {
        let mut timelock = Timelock::new(3_600);
        let id = timelock
            .schedule(TimelockedAction::SetTradingFee { fee_bps: 50 }, 1_000, 4_600)
            .unwrap();

        let err = timelock.take_ready(&id, 4_599).unwrap_err();
        assert_eq!(
            err,
            MarketError::TimelockNotReady {
                execute_after: 4_600,
                now: 4_599
            }
        );
        // Still queued after a premature attempt
        assert_eq!(timelock.len(), 1);

        let taken = timelock.take_ready(&id, 4_600).unwrap();
        assert_eq!(taken.action, TimelockedAction::SetTradingFee { fee_bps: 50 });
        assert!(timelock.is_empty());
    }

    #[test]
    fn test_schedule_respects_min_delay() {
        let mut timelock = Timelock::new(100);
        let result = timelock.schedule(TimelockedAction::SetMinDelay { seconds: 0 }, 50, 149);
        assert!(matches!(result, Err(MarketError::InvalidParameters(_))));
    }

    #[test]
    fn test_duplicate_schedule_rejected() {
        let mut timelock = Timelock::new(0);
        let action = TimelockedAction::SetCreatorFeeShare { share_bps: 2_000 };
        timelock.schedule(action.clone(), 0, 10).unwrap();
        assert!(matches!(
            timelock.schedule(action.clone(), 0, 10),
            Err(MarketError::ActionAlreadyScheduled(_))
        ));
        // Same action at a different time is a distinct entry
        assert!(timelock.schedule(action, 0, 11).is_ok());
    }

    #[test]
    fn test_cancel_and_unknown() {
        let mut timelock = Timelock::new(0);
        let id = timelock
            .schedule(TimelockedAction::SetTreasury { treasury: [9u8; 32] }, 0, 5)
            .unwrap();
        timelock.cancel(&id).unwrap();
        assert!(matches!(
            timelock.take_ready(&id, 10),
            Err(MarketError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_action_ids_are_deterministic() {
        let a = TimelockedAction::SetGraduationThreshold {
            asset_id: [3u8; 32],
            threshold: 1_000,
        };
        assert_eq!(a.action_id(7), a.action_id(7));
        assert_ne!(a.action_id(7), a.action_id(8));
    }
}
