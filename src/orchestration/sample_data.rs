//! Built-in demonstration batch.

use crate::domain::{Action, Decimal, NewTransaction, SecurityCode, Side, TradeId};

/// Six records over four trades: an update, a cancel and an opposing sell.
///
/// Folds to INF=50 and REL=60; ITC nets to zero and has no position.
pub fn sample_transactions() -> Vec<NewTransaction> {
    [
        (1, 1, "REL", 50, Action::Insert, Side::Buy),
        (2, 1, "ITC", 40, Action::Insert, Side::Sell),
        (3, 1, "INF", 70, Action::Insert, Side::Buy),
        (1, 2, "REL", 60, Action::Update, Side::Buy),
        (2, 2, "ITC", 30, Action::Cancel, Side::Buy),
        (4, 1, "INF", 20, Action::Insert, Side::Sell),
    ]
    .into_iter()
    .map(|(trade, version, code, qty, action, side)| {
        NewTransaction::new(
            TradeId::new(trade),
            version,
            SecurityCode::new(code),
            Decimal::from(qty),
            action,
            side,
        )
    })
    .collect()
}
