//! Price Math
//!
//! Fixed-point price computation for constant-product pools. All arithmetic
//! is integer `U256`; prices are expressed on an 18-fraction-digit basis
//! regardless of the underlying token decimals.

use ethers::types::U256;

/// Fraction digits of the common price basis (one unit = 10^18)
pub const PRICE_DECIMALS: u8 = 18;

/// Default target gain in basis points (25%)
pub const DEFAULT_TARGET_GAIN_BPS: u32 = 2_500;

/// Default rug-pull floor, in thousandths of one base-token unit (0.001)
pub const DEFAULT_RUG_FLOOR_THOUSANDTHS: u32 = 1;

/// One unit on the common basis (10^18)
pub fn one() -> U256 {
    U256::exp10(PRICE_DECIMALS as usize)
}

/// Scale a raw reserve amount to the 18-fraction-digit basis.
///
/// Tokens with more than 18 decimals are scaled down; precision loss there
/// mirrors what the pool itself reports.
pub fn normalize_reserve(reserve: U256, decimals: u8) -> U256 {
    if decimals <= PRICE_DECIMALS {
        reserve * U256::exp10((PRICE_DECIMALS - decimals) as usize)
    } else {
        reserve / U256::exp10((decimals - PRICE_DECIMALS) as usize)
    }
}

/// Price of one unit of the new token, denominated in the base token.
///
/// Both reserves are first normalized to the common basis; the result is
/// `adjusted_base * 10^18 / adjusted_new`. Returns `None` when the new-token
/// reserve is zero (empty pool - no meaningful price).
pub fn pair_price(
    base_reserve: U256,
    base_decimals: u8,
    new_reserve: U256,
    new_decimals: u8,
) -> Option<U256> {
    let adjusted_base = normalize_reserve(base_reserve, base_decimals);
    let adjusted_new = normalize_reserve(new_reserve, new_decimals);

    if adjusted_new.is_zero() {
        return None;
    }

    Some(adjusted_base * one() / adjusted_new)
}

/// Increase a price by the given basis points using integer arithmetic.
///
/// `target = price + price * bps / 10000`; the division truncates.
pub fn increase_by_bps(price: U256, bps: u32) -> U256 {
    price + price * U256::from(bps) / U256::from(10_000u64)
}

/// Near-zero liquidity floor for rug-pull detection, scaled to the base
/// token's decimals. `thousandths` is the floor expressed in 1/1000 of one
/// base-token unit (default 1 = 0.001 units).
pub fn rug_floor(base_decimals: u8, thousandths: u32) -> U256 {
    U256::exp10(base_decimals as usize) * U256::from(thousandths) / U256::from(1_000u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: u64, decimals: u8) -> U256 {
        U256::from(n) * U256::exp10(decimals as usize)
    }

    #[test]
    fn test_normalize_identity_at_18() {
        let reserve = units(1_000, 18);
        assert_eq!(normalize_reserve(reserve, 18), reserve);
    }

    #[test]
    fn test_normalize_scales_up_low_decimals() {
        // 1000 units of a 6-decimal token
        let reserve = units(1_000, 6);
        assert_eq!(normalize_reserve(reserve, 6), units(1_000, 18));
    }

    #[test]
    fn test_normalize_scales_down_high_decimals() {
        let reserve = units(1_000, 24);
        assert_eq!(normalize_reserve(reserve, 24), units(1_000, 18));
    }

    #[test]
    fn test_pair_price_scenario() {
        // 500,000 base / 1,000 new, both 18 decimals -> 500 base per new unit
        let price = pair_price(units(500_000, 18), 18, units(1_000, 18), 18).unwrap();
        assert_eq!(price, units(500, 18));
    }

    #[test]
    fn test_pair_price_mixed_decimals() {
        // Same market as above but the base token has 6 decimals
        let price = pair_price(units(500_000, 6), 6, units(1_000, 18), 18).unwrap();
        assert_eq!(price, units(500, 18));
    }

    #[test]
    fn test_pair_price_invariant_under_rescale() {
        // Multiplying both reserves by the same factor leaves the price unchanged
        let p1 = pair_price(units(1_000, 18), 18, units(2_000, 18), 18).unwrap();
        let p2 = pair_price(units(2_000, 18), 18, units(4_000, 18), 18).unwrap();
        assert_eq!(p1, p2);

        let p3 = pair_price(units(17_000, 18), 18, units(34_000, 18), 18).unwrap();
        assert_eq!(p1, p3);
    }

    #[test]
    fn test_pair_price_empty_pool() {
        assert!(pair_price(units(1_000, 18), 18, U256::zero(), 18).is_none());
    }

    #[test]
    fn test_target_price_scenario() {
        // price 500 -> target 625 at 25%
        let target = increase_by_bps(units(500, 18), DEFAULT_TARGET_GAIN_BPS);
        assert_eq!(target, units(625, 18));
    }

    #[test]
    fn test_target_price_exact_formula() {
        // target == price + price*2500/10000 for values not divisible by 10000
        let price = U256::from(10_001u64);
        let target = increase_by_bps(price, 2_500);
        let expected = price + price * U256::from(2_500u64) / U256::from(10_000u64);
        assert_eq!(target, expected);
    }

    #[test]
    fn test_target_price_truncates() {
        // 7 * 2500 / 10000 = 1.75, truncated to 1
        let target = increase_by_bps(U256::from(7u64), 2_500);
        assert_eq!(target, U256::from(8u64));
    }

    #[test]
    fn test_target_price_zero() {
        assert_eq!(increase_by_bps(U256::zero(), 2_500), U256::zero());
    }

    #[test]
    fn test_rug_floor_scaling() {
        // 0.001 of an 18-decimal token = 10^15
        assert_eq!(rug_floor(18, 1), U256::exp10(15));
        // 0.001 of a 6-decimal token = 10^3
        assert_eq!(rug_floor(6, 1), U256::from(1_000u64));
    }

    #[test]
    fn test_rug_floor_configurable() {
        // 0.005 units
        assert_eq!(rug_floor(18, 5), U256::exp10(15) * U256::from(5u64));
    }
}
