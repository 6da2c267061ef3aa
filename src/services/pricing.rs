use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::PricingConfig;
use crate::entities::coupon;
use crate::errors::ServiceError;
use crate::money;
use crate::services::catalog::ResolvedLine;
use crate::services::coupons;

/// Fully computed price for one order. All fields are final amounts in
/// minor units; `as_decimals` converts for storage and responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub subtotal: i64,
    pub coupon_discount: i64,
    pub shipping_charge: i64,
    pub tax: i64,
    pub total: i64,
    /// Why the coupon did not apply, when one was given but rejected.
    /// Coupon problems never fail a quote; they price as no discount.
    pub coupon_rejection: Option<String>,
}

impl PriceBreakdown {
    pub fn as_decimals(&self) -> PriceBreakdownDecimal {
        PriceBreakdownDecimal {
            subtotal: money::from_minor(self.subtotal),
            coupon_discount: money::from_minor(self.coupon_discount),
            shipping_charge: money::from_minor(self.shipping_charge),
            tax: money::from_minor(self.tax),
            total: money::from_minor(self.total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PriceBreakdownDecimal {
    pub subtotal: Decimal,
    pub coupon_discount: Decimal,
    pub shipping_charge: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Deterministic price calculation for checkout.
///
/// Order of operations is fixed: subtotal from re-resolved catalog prices,
/// coupon discount, shipping by threshold, then tax on the discounted
/// subtotal. Shipping is not taxed and not discounted.
#[derive(Clone)]
pub struct PricingEngine {
    free_shipping_threshold: i64,
    flat_shipping_fee: i64,
    tax_basis_points: i64,
    pub currency: String,
}

impl PricingEngine {
    pub fn new(config: &PricingConfig) -> Self {
        Self {
            free_shipping_threshold: money::to_minor(config.free_shipping_threshold),
            flat_shipping_fee: money::to_minor(config.flat_shipping_fee),
            tax_basis_points: money::rate_to_basis_points(config.tax_rate),
            currency: config.currency.clone(),
        }
    }

    /// Prices an order. Every line must be in stock for the requested
    /// quantity; the first shortfall fails the whole quote.
    pub fn quote(
        &self,
        lines: &[ResolvedLine],
        coupon: Option<&coupon::Model>,
        now: DateTime<Utc>,
    ) -> Result<PriceBreakdown, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one item".into(),
            ));
        }

        let mut subtotal: i64 = 0;
        for line in lines {
            if line.stock_quantity < line.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "{} (requested {}, available {})",
                    line.sku, line.quantity, line.stock_quantity
                )));
            }
            subtotal += money::to_minor(line.unit_price) * line.quantity as i64;
        }

        let (coupon_discount, coupon_rejection) = match coupon {
            Some(c) => match coupons::validate(c, subtotal, now) {
                Ok(discount) => (discount, None),
                Err(reason) => (0, Some(reason.to_string())),
            },
            None => (0, None),
        };

        let shipping_charge = if subtotal >= self.free_shipping_threshold {
            0
        } else {
            self.flat_shipping_fee
        };

        let taxable = subtotal - coupon_discount;
        let tax = money::apply_basis_points(taxable, self.tax_basis_points);

        Ok(PriceBreakdown {
            subtotal,
            coupon_discount,
            shipping_charge,
            tax,
            total: taxable + shipping_charge + tax,
            coupon_rejection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::coupon::DiscountType;
    use crate::entities::ItemKind;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn engine() -> PricingEngine {
        PricingEngine::new(&PricingConfig::default())
    }

    fn line(price: Decimal, quantity: i32, stock: i32) -> ResolvedLine {
        ResolvedLine {
            item_kind: ItemKind::Product,
            item_id: Uuid::new_v4(),
            sku: format!("SKU-{quantity}"),
            name: "Test part".into(),
            unit_price: price,
            quantity,
            stock_quantity: stock,
        }
    }

    fn ten_percent_coupon() -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            discount_type: DiscountType::Percentage,
            discount_value: dec!(10),
            min_order_amount: Some(dec!(500)),
            max_discount: Some(dec!(150)),
            usage_limit: None,
            per_user_limit: None,
            usage_count: 0,
            is_active: true,
            start_date: None,
            end_date: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn worked_example_with_capped_coupon() {
        // Subtotal 2000, 10% coupon capped at 150, flat shipping 99,
        // 18% tax on 1850 = 333, total 2282.
        let lines = vec![line(dec!(1200), 1, 5), line(dec!(400), 2, 5)];
        let quote = engine()
            .quote(&lines, Some(&ten_percent_coupon()), Utc::now())
            .unwrap();
        assert_eq!(quote.subtotal, 200_000);
        assert_eq!(quote.coupon_discount, 15_000);
        assert_eq!(quote.shipping_charge, 9_900);
        assert_eq!(quote.tax, 33_300);
        assert_eq!(quote.total, 228_200);
    }

    #[test]
    fn free_shipping_at_threshold() {
        let lines = vec![line(dec!(10000), 1, 2)];
        let quote = engine().quote(&lines, None, Utc::now()).unwrap();
        assert_eq!(quote.shipping_charge, 0);

        let lines = vec![line(dec!(9999.99), 1, 2)];
        let quote = engine().quote(&lines, None, Utc::now()).unwrap();
        assert_eq!(quote.shipping_charge, 9_900);
    }

    #[test]
    fn tax_applies_after_discount_not_shipping() {
        let lines = vec![line(dec!(1000), 1, 1)];
        let mut c = ten_percent_coupon();
        c.min_order_amount = None;
        let quote = engine().quote(&lines, Some(&c), Utc::now()).unwrap();
        // 18% of (1000 - 100) = 162, not 18% of 999 + shipping
        assert_eq!(quote.coupon_discount, 10_000);
        assert_eq!(quote.tax, 16_200);
        assert_eq!(quote.total, 90_000 + 9_900 + 16_200);
    }

    #[test]
    fn out_of_stock_line_fails_quote() {
        let lines = vec![line(dec!(100), 3, 2)];
        let err = engine().quote(&lines, None, Utc::now()).unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock(_)));
    }

    #[test]
    fn empty_order_rejected() {
        let err = engine().quote(&[], None, Utc::now()).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn rejected_coupon_degrades_to_no_discount() {
        let lines = vec![line(dec!(100), 1, 5)];
        let mut c = ten_percent_coupon();
        c.is_active = false;
        c.min_order_amount = None;
        let quote = engine().quote(&lines, Some(&c), Utc::now()).unwrap();
        // Priced as if no coupon was given, with the reason carried along.
        assert_eq!(quote.coupon_discount, 0);
        assert_eq!(quote.tax, 1_800);
        assert_eq!(quote.coupon_rejection.as_deref(), Some("coupon is not active"));
    }
}
