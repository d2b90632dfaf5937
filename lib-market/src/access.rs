//! Role-gated capabilities
//!
//! Admin actions never consult ambient authority: each entry point names the
//! capability it needs and asks [`AccessControl::require`] whether the
//! already-authenticated actor holds it.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::errors::{MarketError, MarketResult};
use crate::types::{short_id, Address};

/// Permission required by a gated entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Grant/revoke capabilities, schedule and execute timelocked actions
    Admin,
    /// Pause and unpause pool trading
    Pause,
    /// Inject harvested revenue into markets
    Harvest,
    /// Collect accrued protocol fees
    Treasury,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Admin => write!(f, "Admin"),
            Capability::Pause => write!(f, "Pause"),
            Capability::Harvest => write!(f, "Harvest"),
            Capability::Treasury => write!(f, "Treasury"),
        }
    }
}

/// Actor → capability grants
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessControl {
    grants: HashMap<Address, BTreeSet<Capability>>,
}

impl AccessControl {
    /// Start with a single admin holding every capability.
    pub fn with_admin(admin: Address) -> Self {
        let mut acl = Self::default();
        acl.grants.insert(
            admin,
            [
                Capability::Admin,
                Capability::Pause,
                Capability::Harvest,
                Capability::Treasury,
            ]
            .into_iter()
            .collect(),
        );
        acl
    }

    pub fn has(&self, actor: &Address, capability: Capability) -> bool {
        self.grants
            .get(actor)
            .map(|caps| caps.contains(&capability))
            .unwrap_or(false)
    }

    pub fn require(&self, actor: &Address, capability: Capability) -> MarketResult<()> {
        if self.has(actor, capability) {
            Ok(())
        } else {
            Err(MarketError::Unauthorized(format!(
                "{} lacks {} capability",
                short_id(actor),
                capability
            )))
        }
    }

    /// Grant `capability` to `grantee`. Caller must hold `Admin`.
    pub fn grant(
        &mut self,
        caller: &Address,
        grantee: Address,
        capability: Capability,
    ) -> MarketResult<()> {
        self.require(caller, Capability::Admin)?;
        self.grants.entry(grantee).or_default().insert(capability);
        Ok(())
    }

    /// Revoke `capability` from `grantee`. Caller must hold `Admin`.
    ///
    /// An admin may not revoke its own `Admin` capability, so the table can
    /// never be left without an administrator by accident.
    pub fn revoke(
        &mut self,
        caller: &Address,
        grantee: &Address,
        capability: Capability,
    ) -> MarketResult<()> {
        self.require(caller, Capability::Admin)?;
        if caller == grantee && capability == Capability::Admin {
            return Err(MarketError::InvalidParameters(
                "admin cannot revoke its own Admin capability".to_string(),
            ));
        }
        if let Some(caps) = self.grants.get_mut(grantee) {
            caps.remove(&capability);
            if caps.is_empty() {
                self.grants.remove(grantee);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: Address = [1u8; 32];
    const KEEPER: Address = [2u8; 32];

    #[test]
    fn test_admin_holds_everything() {
        let acl = AccessControl::with_admin(ADMIN);
        assert!(acl.require(&ADMIN, Capability::Pause).is_ok());
        assert!(acl.require(&ADMIN, Capability::Treasury).is_ok());
    }

    #[test]
    fn test_require_unknown_actor_is_unauthorized() {
        let acl = AccessControl::with_admin(ADMIN);
        assert!(matches!(
            acl.require(&KEEPER, Capability::Harvest),
            Err(MarketError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_grant_and_revoke() {
        let mut acl = AccessControl::with_admin(ADMIN);
        acl.grant(&ADMIN, KEEPER, Capability::Harvest).unwrap();
        assert!(acl.has(&KEEPER, Capability::Harvest));
        assert!(!acl.has(&KEEPER, Capability::Pause));

        acl.revoke(&ADMIN, &KEEPER, Capability::Harvest).unwrap();
        assert!(!acl.has(&KEEPER, Capability::Harvest));
    }

    #[test]
    fn test_non_admin_cannot_grant() {
        let mut acl = AccessControl::with_admin(ADMIN);
        let result = acl.grant(&KEEPER, KEEPER, Capability::Pause);
        assert!(matches!(result, Err(MarketError::Unauthorized(_))));
    }

    #[test]
    fn test_admin_cannot_drop_own_admin() {
        let mut acl = AccessControl::with_admin(ADMIN);
        assert!(acl.revoke(&ADMIN, &ADMIN, Capability::Admin).is_err());
        assert!(acl.has(&ADMIN, Capability::Admin));
    }
}
