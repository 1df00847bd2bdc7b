//! Pure computation for position derivation.
//!
//! - `resolver`: a trade's versions -> its current contribution
//! - `accumulator`: owned per-security sums and the diff against stored positions
//! - `validator`: latest-version-only edit gate

pub mod accumulator;
pub mod resolver;
pub mod validator;

pub use accumulator::{NetOverflow, PositionAccumulator};
pub use resolver::{group_by_trade, latest_version, resolve_trade, TradeImpact};
pub use validator::{classify, EditDecision, EditRejection, EditValidator};
