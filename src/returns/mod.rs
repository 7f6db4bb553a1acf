//! Cash-flow-adjusted return calculation
//!
//! A net inflow inflates today's assets without being investment gain
//! and a net outflow deflates them without being a loss, so the raw
//! day-over-day change is adjusted by the day's net flow before dividing
//! by yesterday's base:
//!
//! ```text
//! return_pct = (today - yesterday - net_flow) / yesterday * 100
//! ```
//!
//! The divisor is yesterday's asset, unadjusted. With a non-positive
//! base the return is undefined and reported as such, never as zero and
//! never as a division fault.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Result of a return calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReturnOutcome {
    /// Percentage return
    Pct(Decimal),
    /// Base asset was zero or negative; mathematically undefined
    Undefined,
}

impl ReturnOutcome {
    pub fn pct(&self) -> Option<Decimal> {
        match self {
            ReturnOutcome::Pct(p) => Some(*p),
            ReturnOutcome::Undefined => None,
        }
    }
}

/// Compute the cash-flow-adjusted day-over-day return percentage.
///
/// `net_flow_today` is inflow minus outflow for the day.
pub fn compute_return(
    today_asset: Decimal,
    yesterday_asset: Decimal,
    net_flow_today: Decimal,
) -> ReturnOutcome {
    if yesterday_asset <= Decimal::ZERO {
        return ReturnOutcome::Undefined;
    }

    let raw_return = today_asset - yesterday_asset;
    let adjusted_return = raw_return - net_flow_today;
    ReturnOutcome::Pct(adjusted_return / yesterday_asset * Decimal::from(100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_inflow_is_not_gain() {
        // 1,050,000 today over 1,000,000 with a 40,000 inflow:
        // raw 50,000, adjusted 10,000 -> 1.0%
        let outcome = compute_return(dec!(1050000), dec!(1000000), dec!(40000));
        assert_eq!(outcome, ReturnOutcome::Pct(dec!(1)));
    }

    #[test]
    fn test_outflow_is_not_loss() {
        // Same change with a 40,000 outflow: adjusted 90,000 -> 9.0%
        let outcome = compute_return(dec!(1050000), dec!(1000000), dec!(-40000));
        assert_eq!(outcome, ReturnOutcome::Pct(dec!(9)));
    }

    #[test]
    fn test_zero_base_is_undefined_not_fault() {
        assert_eq!(
            compute_return(dec!(1050000), dec!(0), dec!(0)),
            ReturnOutcome::Undefined
        );
        assert_eq!(
            compute_return(dec!(1050000), dec!(-10), dec!(0)),
            ReturnOutcome::Undefined
        );
        assert_eq!(compute_return(dec!(1050000), dec!(0), dec!(0)).pct(), None);
    }

    #[test]
    fn test_formula_identity_over_positive_bases() {
        let cases = [
            (dec!(1000), dec!(900), dec!(50)),
            (dec!(500), dec!(1200), dec!(-75)),
            (dec!(0), dec!(1), dec!(0)),
            (dec!(123456.78), dec!(100000.01), dec!(0.5)),
        ];
        for (today, yesterday, flow) in cases {
            let expected = (today - yesterday - flow) / yesterday * dec!(100);
            assert_eq!(
                compute_return(today, yesterday, flow),
                ReturnOutcome::Pct(expected)
            );
        }
    }

    #[test]
    fn test_flat_day_with_no_flow_is_zero_pct() {
        assert_eq!(
            compute_return(dec!(1000000), dec!(1000000), dec!(0)),
            ReturnOutcome::Pct(dec!(0))
        );
    }
}
