//! Integer fee rate arithmetic.

use bitcoin::{Amount, SignedAmount};

/// Fee rate in satoshis per virtual kilobyte.
///
/// Package fee rates are compared by cross-multiplication so no division (and
/// no floating point) is ever involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeeRate(u64);

impl FeeRate {
    /// Create a fee rate from satoshis per virtual byte.
    pub fn from_sat_per_vb(sat_vb: u64) -> Self {
        Self(sat_vb.checked_mul(1000).expect("fee rate overflow"))
    }

    /// Create a fee rate from satoshis per kilovirtual byte.
    pub fn from_sat_per_kvb(sat_kvb: u64) -> Self {
        Self(sat_kvb)
    }

    /// The fee rate in satoshis per kilovirtual byte.
    pub fn to_sat_per_kvb(self) -> u64 {
        self.0
    }

    /// Smallest fee that puts `vsize` virtual bytes at or above this rate.
    pub fn fee_for(self, vsize: u64) -> Amount {
        let fee = (self.0 as u128 * vsize as u128).div_ceil(1000);
        Amount::from_sat(u64::try_from(fee).expect("fee overflow"))
    }

    /// Signed variant of [`Self::fee_for`], for aggregate deficits that may
    /// come out at or below zero.
    pub fn fee_for_signed(self, vsize: u64) -> SignedAmount {
        SignedAmount::from_sat(
            i64::try_from(self.fee_for(vsize).to_sat()).expect("fee overflow"),
        )
    }

    /// Whether a package paying `fee` over `vsize` virtual bytes meets this
    /// rate. `fee / vsize >= rate / 1000`, cross-multiplied.
    pub fn is_met_by(self, fee: Amount, vsize: u64) -> bool {
        debug_assert!(vsize > 0);
        fee.to_sat() as u128 * 1000 >= self.0 as u128 * vsize as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_for_rounds_up() {
        let rate = FeeRate::from_sat_per_kvb(1800);
        assert_eq!(rate.fee_for(100), Amount::from_sat(180));
        assert_eq!(rate.fee_for(101), Amount::from_sat(182));
        assert_eq!(rate.fee_for(0), Amount::from_sat(0));
    }

    #[test]
    fn test_cross_multiplied_comparison() {
        // 1.8 sat/vB target.
        let rate = FeeRate::from_sat_per_kvb(1_800);
        assert!(rate.is_met_by(Amount::from_sat(400), 200));
        assert!(!rate.is_met_by(Amount::from_sat(150), 100));
        // Exactly at the rate counts as met.
        assert!(rate.is_met_by(Amount::from_sat(180), 100));
    }

    #[test]
    fn test_sat_per_vb_scaling() {
        assert_eq!(FeeRate::from_sat_per_vb(2).to_sat_per_kvb(), 2000);
        assert_eq!(FeeRate::from_sat_per_vb(1).fee_for(250), Amount::from_sat(250));
    }
}
