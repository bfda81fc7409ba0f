//! Server-side pricing: catalog lookup, coupon discount and per-line
//! allocation of the discount.

use std::collections::HashMap;
use thiserror::Error;

use crate::models::Plan;
use crate::services::coupons::{percentage_discount, AppliedCoupon, Coupon};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid plan id: {0}")]
    UnknownPlan(String),

    #[error("Quantity for plan {0} must be at least 1")]
    ZeroQuantity(String),

    #[error("Cart total overflows")]
    Overflow,
}

/// One requested line, before pricing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRequest {
    pub plan_id: String,
    pub quantity: u32,
}

impl LineRequest {
    pub fn single(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            quantity: 1,
        }
    }
}

/// A line priced from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub plan_id: String,
    pub title: String,
    pub unit_price: u64,
    pub quantity: u32,
    /// `unit_price * quantity` before discount.
    pub amount: u64,
    pub google_form_url: Option<String>,
}

/// Authoritative price of a cart. All amounts are minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub lines: Vec<PricedLine>,
    pub subtotal: u64,
    pub discount: u64,
    pub payable: u64,
    pub coupon: Option<AppliedCoupon>,
}

impl Quote {
    pub fn plan_ids(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.plan_id.clone()).collect()
    }

    pub fn plan_titles(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.title.clone()).collect()
    }

    /// Amount charged for each line once the discount is spread.
    pub fn net_amounts(&self) -> Vec<u64> {
        let amounts: Vec<u64> = self.lines.iter().map(|l| l.amount).collect();
        allocate_discount(&amounts, self.discount)
    }
}

/// Price `requested` lines against `catalog`, then apply `coupon`.
///
/// Every occurrence of a plan id is priced, so a repeated id is charged
/// twice.
pub fn quote(
    catalog: &[Plan],
    requested: &[LineRequest],
    coupon: Option<&Coupon>,
) -> Result<Quote, PricingError> {
    if requested.is_empty() {
        return Err(PricingError::EmptyCart);
    }

    let by_id: HashMap<&str, &Plan> = catalog.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut lines = Vec::with_capacity(requested.len());
    let mut subtotal: u64 = 0;
    for line in requested {
        let plan = by_id
            .get(line.plan_id.as_str())
            .ok_or_else(|| PricingError::UnknownPlan(line.plan_id.clone()))?;
        if line.quantity == 0 {
            return Err(PricingError::ZeroQuantity(line.plan_id.clone()));
        }
        let amount = plan
            .price
            .checked_mul(u64::from(line.quantity))
            .ok_or(PricingError::Overflow)?;
        subtotal = subtotal.checked_add(amount).ok_or(PricingError::Overflow)?;
        lines.push(PricedLine {
            plan_id: plan.id.clone(),
            title: plan.title.clone(),
            unit_price: plan.price,
            quantity: line.quantity,
            amount,
            google_form_url: plan.google_form_url.clone(),
        });
    }

    let coupon = coupon.map(|c| AppliedCoupon {
        code: c.code.clone(),
        percent: c.discount,
        discount: percentage_discount(subtotal, c.discount),
    });
    let discount = coupon.as_ref().map(|c| c.discount).unwrap_or(0);

    Ok(Quote {
        lines,
        subtotal,
        discount,
        payable: subtotal - discount,
        coupon,
    })
}

/// Spread `discount` over `amounts` proportionally and return the net
/// amount of each line.
///
/// Shares are floored; the rounding remainder goes to the last line, then
/// to earlier lines when the last one cannot absorb it. The result sums to
/// `sum(amounts) - discount` and no line goes negative.
pub fn allocate_discount(amounts: &[u64], discount: u64) -> Vec<u64> {
    let total: u128 = amounts.iter().map(|a| u128::from(*a)).sum();
    if total == 0 || discount == 0 {
        return amounts.to_vec();
    }
    let discount = u128::from(discount).min(total);

    let mut shares: Vec<u128> = amounts
        .iter()
        .map(|a| u128::from(*a) * discount / total)
        .collect();

    let mut remainder = discount - shares.iter().sum::<u128>();
    for (share, amount) in shares.iter_mut().zip(amounts).rev() {
        if remainder == 0 {
            break;
        }
        let room = u128::from(*amount) - *share;
        let take = room.min(remainder);
        *share += take;
        remainder -= take;
    }

    amounts
        .iter()
        .zip(shares)
        .map(|(amount, share)| amount - share as u64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(id: &str, price: u64) -> Plan {
        Plan {
            id: id.into(),
            title: format!("{} plan", id),
            price,
            original_price: None,
            description: String::new(),
            features: vec![],
            popular: false,
            period: None,
            google_form_url: Some(format!("https://forms.example.com/{}", id)),
        }
    }

    fn catalog() -> Vec<Plan> {
        vec![plan("basic", 49_900), plan("gold", 149_900), plan("free", 0)]
    }

    #[test]
    fn quote_sums_catalog_prices() {
        let q = quote(
            &catalog(),
            &[LineRequest::single("basic"), LineRequest::single("gold")],
            None,
        )
        .unwrap();
        assert_eq!(q.subtotal, 199_800);
        assert_eq!(q.payable, 199_800);
        assert_eq!(q.plan_ids(), vec!["basic", "gold"]);
    }

    #[test]
    fn quote_respects_quantity_and_repeats() {
        let q = quote(
            &catalog(),
            &[
                LineRequest {
                    plan_id: "basic".into(),
                    quantity: 2,
                },
                LineRequest::single("basic"),
            ],
            None,
        )
        .unwrap();
        assert_eq!(q.subtotal, 3 * 49_900);
    }

    #[test]
    fn unknown_plan_is_rejected() {
        let err = quote(&catalog(), &[LineRequest::single("ghost")], None).unwrap_err();
        assert_eq!(err, PricingError::UnknownPlan("ghost".into()));
        assert_eq!(quote(&catalog(), &[], None).unwrap_err(), PricingError::EmptyCart);
    }

    #[test]
    fn coupon_reduces_payable() {
        let coupon = Coupon {
            code: "FIRSTDATE20".into(),
            discount: 20,
        };
        let q = quote(&catalog(), &[LineRequest::single("gold")], Some(&coupon)).unwrap();
        assert_eq!(q.discount, 29_980);
        assert_eq!(q.payable, 119_920);
        assert_eq!(q.coupon.unwrap().code, "FIRSTDATE20");
    }

    #[test]
    fn allocation_sums_exactly() {
        let amounts = [49_900, 149_900, 1];
        for discount in [0, 1, 7, 19_980, 100_000, 199_801] {
            let net = allocate_discount(&amounts, discount);
            let total: u64 = amounts.iter().sum();
            assert_eq!(net.iter().sum::<u64>(), total - discount);
            for (n, a) in net.iter().zip(amounts.iter()) {
                assert!(n <= a);
            }
        }
    }

    #[test]
    fn allocation_remainder_lands_on_last_line() {
        // 10 over three equal lines: 3, 3, 4
        assert_eq!(allocate_discount(&[100, 100, 100], 10), vec![97, 97, 96]);
    }

    #[test]
    fn allocation_spills_when_last_line_is_free() {
        assert_eq!(allocate_discount(&[3, 3, 0], 5), vec![1, 0, 0]);
    }
}
