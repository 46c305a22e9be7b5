//! Fee and ledger arithmetic for a settled quest.
//!
//! The platform fee is a flat per-settlement amount, never a percentage:
//! it is added to what the requester pays and deducted from what the
//! adventurer receives, so `requester_charge − adventurer_payout` is
//! always exactly `2 × fee`. The tip passes through untouched — 100% of
//! it reaches the adventurer.

use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Both sides of one settled quest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// What the requester is charged: `price + tip + fee`.
    pub requester_charge: Money,
    /// What the adventurer receives: `price + tip − fee`.
    pub adventurer_payout: Money,
}

/// Compute both sides of a settlement. Pure; charged once per settled
/// quest, never per retry.
pub fn settle(price: Money, tip: Money, fee: Money) -> Settlement {
    Settlement {
        requester_charge: price + tip + fee,
        adventurer_payout: price + tip - fee,
    }
}
