use crate::domain::{Decimal, SecurityCode, TradeId, Transaction};
use std::collections::BTreeMap;
use tracing::warn;

/// What one trade currently contributes to positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeImpact {
    pub trade_id: TradeId,
    pub security_code: SecurityCode,
    /// Signed quantity; zero for a cancelled trade.
    pub quantity: Decimal,
}

/// Resolve all versions of one trade into its contribution.
///
/// The authoritative record is the highest version; when two records share
/// that version, the one with the higher store id wins. A `CANCEL` on any
/// version zeroes the trade on the authoritative record's security.
///
/// Returns `None` for an empty group. Input order does not matter.
pub fn resolve_trade(versions: &[Transaction]) -> Option<TradeImpact> {
    let latest = latest_version(versions)?;

    let tied = versions
        .iter()
        .filter(|t| t.version == latest.version)
        .count();
    if tied > 1 {
        warn!(
            trade_id = %latest.trade_id,
            version = latest.version,
            chosen_id = %latest.id,
            "Data integrity anomaly: duplicate latest version, using highest store id"
        );
    }

    let quantity = if versions.iter().any(Transaction::is_cancel) {
        Decimal::zero()
    } else {
        latest.signed_quantity()
    };

    Some(TradeImpact {
        trade_id: latest.trade_id,
        security_code: latest.security_code.clone(),
        quantity,
    })
}

/// The latest-version record of a trade: highest version, then highest store id.
pub fn latest_version(versions: &[Transaction]) -> Option<&Transaction> {
    versions
        .iter()
        .max_by(|a, b| a.version.cmp(&b.version).then_with(|| a.id.cmp(&b.id)))
}

/// Group ledger rows by trade, in trade id order.
pub fn group_by_trade(transactions: Vec<Transaction>) -> BTreeMap<TradeId, Vec<Transaction>> {
    let mut groups: BTreeMap<TradeId, Vec<Transaction>> = BTreeMap::new();
    for tx in transactions {
        groups.entry(tx.trade_id).or_default().push(tx);
    }
    groups
}
