/// Recompute the odds product for a combination wager after voids.
///
/// Each entry is `(odds, voided)`; voided legs contribute 1.0 — they are
/// removed from the product one by one, which for a product is
/// order-independent.
pub fn combined_odds(legs: &[(f64, bool)]) -> f64 {
    legs.iter()
        .map(|(odds, voided)| if *voided { 1.0 } else { *odds })
        .product()
}

/// Round a payout to cents. Settled amounts are user-visible money.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voided_legs_collapse_to_even_odds() {
        let odds = combined_odds(&[(1.8, false), (2.2, true)]);
        assert!((odds - 1.8).abs() < 1e-9);

        let all_void = combined_odds(&[(1.8, true), (2.2, true)]);
        assert!((all_void - 1.0).abs() < 1e-9);
    }

    #[test]
    fn multiple_voids_are_order_independent() {
        let a = combined_odds(&[(1.5, true), (2.0, false), (3.0, true)]);
        let b = combined_odds(&[(3.0, true), (1.5, true), (2.0, false)]);
        assert!((a - b).abs() < 1e-9);
        assert!((a - 2.0).abs() < 1e-9);
    }

    #[test]
    fn cent_rounding() {
        assert_eq!(round_cents(10.0 * 1.857), 18.57);
        assert_eq!(round_cents(0.005), 0.01);
    }
}
