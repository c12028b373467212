//! Property-based tests for the numeric core and pool admission.
//!
//! These tests use proptest to check invariants of fixed-point arithmetic,
//! the two series engines and the pool's capacity bound across a wide range
//! of random inputs.

use proptest::prelude::*;

use fetchpi::{
    ApproximationEngine, ChudnovskySeries, Decimal, LeibnizSeries, PoolError, Precision, TaskPool,
};

const PI_100: &str = "3.1415926535897932384626433832795028841971693993751058209749445923078164062862089986280348253421170679";

fn pi() -> Decimal {
    PI_100.parse().unwrap()
}

fn decimal() -> impl Strategy<Value = Decimal> {
    ("-?[0-9]{1,12}", "[0-9]{0,12}").prop_map(|(int, frac)| {
        let literal = if frac.is_empty() {
            int
        } else {
            format!("{int}.{frac}")
        };
        literal.parse().unwrap()
    })
}

proptest! {
    /// Display output parses back to the same value and scale.
    #[test]
    fn decimal_display_parses_back(value in decimal()) {
        let reparsed: Decimal = value.to_string().parse().unwrap();
        prop_assert_eq!(reparsed, value);
    }

    /// Widening the scale and narrowing it again is lossless.
    #[test]
    fn rescale_widen_then_narrow_is_identity(value in decimal(), extra in 0u32..20) {
        let widened = value.rescale(value.scale() + extra);
        prop_assert_eq!(widened.rescale(value.scale()), value);
    }

    /// Adding then subtracting the same operand restores the first operand.
    #[test]
    fn add_then_sub_restores(a in decimal(), b in decimal()) {
        let restored = &(&a + &b) - &b;
        prop_assert_eq!(restored.rescale(a.scale()), a);
    }

    /// Agreement in digits does not depend on argument order.
    #[test]
    fn matching_digits_is_symmetric(a in decimal(), b in decimal()) {
        prop_assert_eq!(a.matching_digits(&b), b.matching_digits(&a));
    }

    /// Leibniz partial sums alternate around pi: above after odd step
    /// counts, below after even ones.
    #[test]
    fn leibniz_brackets_pi(steps in 1u64..300) {
        let mut engine = LeibnizSeries::new(Precision::new(20));
        let mut last = engine.step();
        for _ in 1..steps {
            last = engine.step();
        }
        let above = (&last.value - &pi()).mantissa().sign() == num::bigint::Sign::Plus;
        prop_assert_eq!(above, steps % 2 == 1);
    }

    /// A handful of Chudnovsky steps reaches the configured precision.
    #[test]
    fn chudnovsky_reaches_configured_precision(digits in 10u32..90) {
        let mut engine = ChudnovskySeries::new(Precision::new(digits));
        let steps = digits / 14 + 2;
        let mut last = engine.step();
        for _ in 1..steps {
            last = engine.step();
        }
        prop_assert_eq!(last.value.scale(), digits);
        prop_assert!(last.value.matching_digits(&pi()) >= digits - 1);
    }

    /// Non-blocking admission accepts exactly `capacity` blocked tasks.
    #[test]
    fn pool_never_exceeds_capacity(capacity in 1usize..8, submissions in 0usize..20) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let pool = TaskPool::new(capacity);
            let mut accepted = 0;
            let mut rejected = 0;
            for i in 0..submissions {
                match pool.try_submit(format!("t{i}"), std::future::pending::<()>()) {
                    Ok(_) => accepted += 1,
                    Err(PoolError::CapacityExceeded { capacity: c }) => {
                        assert_eq!(c, capacity);
                        rejected += 1;
                    }
                    Err(other) => panic!("unexpected error {other:?}"),
                }
                assert!(pool.size() <= capacity);
            }
            assert_eq!(accepted, submissions.min(capacity));
            assert_eq!(rejected, submissions.saturating_sub(capacity));
        });
    }
}
