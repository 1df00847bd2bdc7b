use super::TradeImpact;
use crate::domain::{Decimal, Position, SecurityCode};
use crate::store::PositionDiff;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// A security's net quantity left the representable range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("net quantity for {security_code} out of range")]
pub struct NetOverflow {
    pub security_code: SecurityCode,
}

/// Working net quantities for one recalculation.
///
/// Owned by a single recalculation call and consumed when its diff is taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionAccumulator {
    net: BTreeMap<SecurityCode, Decimal>,
}

impl PositionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the currently stored positions.
    pub fn seeded(existing: &[Position]) -> Self {
        PositionAccumulator {
            net: existing
                .iter()
                .map(|p| (p.security_code.clone(), p.quantity))
                .collect(),
        }
    }

    /// Zero the given securities so they can be re-derived from scratch.
    pub fn reset<'a, I>(&mut self, codes: I)
    where
        I: IntoIterator<Item = &'a SecurityCode>,
    {
        for code in codes {
            self.net.insert(code.clone(), Decimal::zero());
        }
    }

    /// Merge a trade's contribution by addition.
    ///
    /// A zero impact still registers the security, so a cancelled trade
    /// prunes a stale stored position. On overflow the stored sum is left
    /// as it was.
    pub fn add(&mut self, impact: &TradeImpact) -> Result<(), NetOverflow> {
        let net = self
            .net
            .entry(impact.security_code.clone())
            .or_insert_with(Decimal::zero);
        *net = net
            .checked_add(impact.quantity)
            .ok_or_else(|| NetOverflow {
                security_code: impact.security_code.clone(),
            })?;
        Ok(())
    }

    pub fn quantity(&self, code: &SecurityCode) -> Decimal {
        self.net.get(code).copied().unwrap_or_default()
    }

    /// Nonzero entries, security code ascending.
    pub fn positions(&self) -> Vec<Position> {
        self.net
            .iter()
            .filter(|(_, qty)| !qty.is_zero())
            .map(|(code, qty)| Position::new(code.clone(), *qty))
            .collect()
    }

    /// Changes needed to turn `existing` into this accumulator's nonzero set.
    ///
    /// Unchanged positions produce no upsert.
    pub fn diff_against(&self, existing: &[Position]) -> PositionDiff {
        let stored: BTreeMap<&SecurityCode, Decimal> = existing
            .iter()
            .map(|p| (&p.security_code, p.quantity))
            .collect();

        let upserts = self
            .positions()
            .into_iter()
            .filter(|p| stored.get(&p.security_code) != Some(&p.quantity))
            .collect();

        let deletes: BTreeSet<SecurityCode> = stored
            .keys()
            .filter(|code| self.quantity(code).is_zero())
            .map(|code| (*code).clone())
            .collect();

        PositionDiff {
            upserts,
            deletes: deletes.into_iter().collect(),
        }
    }
}
