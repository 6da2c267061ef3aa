use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tracing::debug;
use uuid::Uuid;

use crate::entities::coupon::{self, DiscountType};
use crate::errors::ServiceError;
use crate::money;

/// Why a coupon cannot be applied. At checkout the reason degrades to a
/// zero discount and is reported alongside the order rather than failing it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponError {
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon is not yet valid")]
    NotYetActive,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    UsageExhausted,
    #[error("order subtotal below coupon minimum of {required}")]
    BelowMinimum { required: rust_decimal::Decimal },
}

impl From<CouponError> for ServiceError {
    fn from(err: CouponError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

/// Pure eligibility check plus discount calculation, in minor units.
///
/// A valid coupon can still yield a zero discount (a fixed discount larger
/// than the subtotal is clamped, a percentage of a tiny subtotal can round to
/// zero); that is not an error, and a zero-discount application never
/// consumes a usage.
pub fn validate(
    coupon: &coupon::Model,
    subtotal_minor: i64,
    now: DateTime<Utc>,
) -> Result<i64, CouponError> {
    if !coupon.is_active {
        return Err(CouponError::Inactive);
    }
    if let Some(start) = coupon.start_date {
        if now < start {
            return Err(CouponError::NotYetActive);
        }
    }
    if let Some(end) = coupon.end_date {
        if now > end {
            return Err(CouponError::Expired);
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.usage_count >= limit {
            return Err(CouponError::UsageExhausted);
        }
    }
    if let Some(min) = coupon.min_order_amount {
        if subtotal_minor < money::to_minor(min) {
            return Err(CouponError::BelowMinimum { required: min });
        }
    }

    let raw = match coupon.discount_type {
        DiscountType::Percentage => {
            let basis_points = money::rate_to_basis_points(coupon.discount_value / rust_decimal::Decimal::from(100));
            money::apply_basis_points(subtotal_minor, basis_points)
        }
        DiscountType::Fixed => money::to_minor(coupon.discount_value),
    };

    let mut discount = raw.min(subtotal_minor);
    if let Some(cap) = coupon.max_discount {
        discount = discount.min(money::to_minor(cap));
    }
    Ok(discount.max(0))
}

/// Coupon lookup and usage accounting.
#[derive(Clone)]
pub struct CouponService;

impl CouponService {
    pub fn new() -> Self {
        Self
    }

    /// Finds a coupon by code, case-insensitively. Codes are stored
    /// uppercase.
    pub async fn find_by_code<C: ConnectionTrait>(
        &self,
        db: &C,
        code: &str,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        let normalized = code.trim().to_uppercase();
        let found = coupon::Entity::find()
            .filter(coupon::Column::Code.eq(normalized))
            .one(db)
            .await?;
        Ok(found)
    }

    /// Consumes one usage of the coupon, guarded against racing checkouts:
    /// the increment only lands while `usage_count` is still under the
    /// limit. Returns an error when a concurrent checkout took the last use.
    pub async fn consume<C: ConnectionTrait>(
        &self,
        db: &C,
        coupon: &coupon::Model,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let mut update = coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(coupon::Column::Id.eq(coupon.id))
            .filter(coupon::Column::IsActive.eq(true));

        if let Some(limit) = coupon.usage_limit {
            update = update.filter(coupon::Column::UsageCount.lt(limit));
        }

        let result = update.exec(db).await?;
        if result.rows_affected == 0 {
            return Err(CouponError::UsageExhausted.into());
        }
        debug!(code = %coupon.code, %order_id, "coupon usage consumed");
        Ok(())
    }
}

impl Default for CouponService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_coupon() -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            discount_type: DiscountType::Percentage,
            discount_value: dec!(10),
            min_order_amount: Some(dec!(500)),
            max_discount: Some(dec!(150)),
            usage_limit: Some(100),
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
    fn percentage_discount_capped_at_max() {
        // 10% of 2000.00 is 200.00, capped at 150.00
        let discount = validate(&base_coupon(), 200_000, Utc::now()).unwrap();
        assert_eq!(discount, 15_000);
    }

    #[test]
    fn percentage_discount_below_cap() {
        // 10% of 1000.00 is 100.00, under the cap
        let discount = validate(&base_coupon(), 100_000, Utc::now()).unwrap();
        assert_eq!(discount, 10_000);
    }

    #[test]
    fn fixed_discount_clamped_to_subtotal() {
        let mut c = base_coupon();
        c.discount_type = DiscountType::Fixed;
        c.discount_value = dec!(800);
        c.min_order_amount = None;
        c.max_discount = None;
        let discount = validate(&c, 60_000, Utc::now()).unwrap();
        assert_eq!(discount, 60_000);
    }

    #[test]
    fn inactive_coupon_rejected() {
        let mut c = base_coupon();
        c.is_active = false;
        assert_eq!(
            validate(&c, 200_000, Utc::now()),
            Err(CouponError::Inactive)
        );
    }

    #[test]
    fn expired_and_not_yet_active_windows() {
        let now = Utc::now();
        let mut c = base_coupon();
        c.end_date = Some(now - chrono::Duration::hours(1));
        assert_eq!(validate(&c, 200_000, now), Err(CouponError::Expired));

        let mut c = base_coupon();
        c.start_date = Some(now + chrono::Duration::hours(1));
        assert_eq!(validate(&c, 200_000, now), Err(CouponError::NotYetActive));
    }

    #[test]
    fn exhausted_usage_rejected() {
        let mut c = base_coupon();
        c.usage_limit = Some(5);
        c.usage_count = 5;
        assert_eq!(
            validate(&c, 200_000, Utc::now()),
            Err(CouponError::UsageExhausted)
        );
    }

    #[test]
    fn below_minimum_rejected() {
        let c = base_coupon();
        assert_eq!(
            validate(&c, 49_999, Utc::now()),
            Err(CouponError::BelowMinimum { required: dec!(500) })
        );
        // Exactly at the minimum is allowed.
        assert!(validate(&c, 50_000, Utc::now()).is_ok());
    }
}
