//! Discount rule engine
//!
//! A fixed, ordered eligibility pipeline followed by amount computation.
//! Stages run in order because earlier failures are cheaper to evaluate and
//! produce more specific reasons; every stage either passes or ends the
//! pipeline with a terminal [`DiscountRejection`]. A rejection is a business
//! outcome, not an error: the calculation carries on and taxes the full
//! subtotal.

use jiff::civil::Date;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::cart::CartLine;
use crate::inputs::{DiscountCode, GatewaySelector};
use crate::provider::{
    Discount, DiscountKind, DiscountScope, PaymentRestriction, RedemptionLimit, UserTargeting,
};
use crate::resolver::{ReferenceResolver, ResolveError};

/// Terminal failure reasons from the eligibility pipeline, one per stage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscountRejection {
    /// No such code, or the discount is inactive, deleted, or outside its
    /// validity window.
    #[error("discount code is invalid or expired")]
    InvalidCode,

    /// The converted subtotal is below the discount's minimum.
    #[error("cart subtotal is below the minimum of {minimum} for this discount")]
    MinimumNotMet {
        /// The required minimum, in the target currency.
        minimum: Decimal,
    },

    /// The discount's global redemption cap has been exhausted.
    #[error("discount has reached its global usage limit")]
    UsageLimitReached,

    /// The caller is outside the discount's user targeting.
    #[error("discount is not available to this user")]
    NotTargeted,

    /// No cart line falls inside the discount's category restriction.
    #[error("discount does not apply to any item in the cart")]
    NotApplicable,

    /// The selected payment method is not on the discount's allow list.
    #[error("discount cannot be used with the selected payment method")]
    PaymentMethodNotAllowed,

    /// A once-per-user discount the caller has already redeemed.
    #[error("discount has already been redeemed by this user")]
    AlreadyRedeemed,
}

impl DiscountRejection {
    /// Stable machine-readable code for this rejection.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCode => "InvalidCode",
            Self::MinimumNotMet { .. } => "MinimumNotMet",
            Self::UsageLimitReached => "UsageLimitReached",
            Self::NotTargeted => "NotTargeted",
            Self::NotApplicable => "NotApplicable",
            Self::PaymentMethodNotAllowed => "PaymentMethodNotAllowed",
            Self::AlreadyRedeemed => "AlreadyRedeemed",
        }
    }
}

/// Everything the pipeline needs besides the discount record itself.
#[derive(Debug)]
pub(crate) struct DiscountContext<'a> {
    /// Validated cart lines.
    pub lines: &'a [CartLine],

    /// Converted subtotal, full precision.
    pub subtotal: Decimal,

    /// Rate used to convert base-currency amounts.
    pub exchange_rate: Decimal,

    /// The caller's identity, supplied explicitly by the caller.
    pub user_id: u64,

    /// Selected payment gateway, if any.
    pub gateway: Option<&'a GatewaySelector>,

    /// Date used for validity-window checks.
    pub today: Date,
}

/// Outcome of discount resolution for one calculation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DiscountOutcome {
    /// No code was supplied.
    NotRequested,

    /// The pipeline ended at a stage with a terminal reason.
    Rejected(DiscountRejection),

    /// All stages passed; `amount` is full precision and already clamped to
    /// the subtotal.
    Applied {
        /// The discount amount in the target currency.
        amount: Decimal,
        /// The record the amount was computed from.
        discount: Discount,
    },
}

/// Runs the full pipeline for a sanitized code.
///
/// # Errors
///
/// Returns a [`ResolveError`] only for reference-data failures; every
/// business-rule failure is a [`DiscountOutcome::Rejected`].
pub(crate) async fn resolve(
    resolver: &ReferenceResolver,
    code: &DiscountCode,
    ctx: &DiscountContext<'_>,
) -> Result<DiscountOutcome, ResolveError> {
    // Stage 1: lookup and validity.
    let Some(discount) = resolver.discount(code).await? else {
        return Ok(DiscountOutcome::Rejected(DiscountRejection::InvalidCode));
    };

    if !discount.is_live(ctx.today) {
        return Ok(DiscountOutcome::Rejected(DiscountRejection::InvalidCode));
    }

    // Stage 2: minimum amount.
    if let Some(minimum) = discount.minimum_amount
        && ctx.subtotal < minimum
    {
        return Ok(DiscountOutcome::Rejected(DiscountRejection::MinimumNotMet {
            minimum,
        }));
    }

    // Stage 3: global usage cap.
    if let Some(limit) = discount.usage_limit {
        let used = resolver.discount_usages(discount.id).await?;

        if used >= limit {
            return Ok(DiscountOutcome::Rejected(
                DiscountRejection::UsageLimitReached,
            ));
        }
    }

    // Stage 4: user targeting. The closed enum means an unknown targeting
    // value cannot reach this point; the store boundary fails such rows.
    let targeted = match discount.targeting {
        UserTargeting::AllUsers => true,
        UserTargeting::FirstTimeUsers => resolver.first_time_user(ctx.user_id).await?,
        UserTargeting::SelectedUsers => discount.selected_user_ids.contains(&ctx.user_id),
    };

    if !targeted {
        return Ok(DiscountOutcome::Rejected(DiscountRejection::NotTargeted));
    }

    // Stage 5: package/category restriction.
    if !scope_matches(&discount, ctx.lines) {
        return Ok(DiscountOutcome::Rejected(DiscountRejection::NotApplicable));
    }

    // Stage 6: payment-method restriction.
    if discount.payment_restriction == PaymentRestriction::Selected {
        let allowed = ctx
            .gateway
            .is_some_and(|gateway| discount.allowed_payment_methods.contains(gateway.as_str()));

        if !allowed {
            return Ok(DiscountOutcome::Rejected(
                DiscountRejection::PaymentMethodNotAllowed,
            ));
        }
    }

    // Stage 7: per-user redemption cap.
    if discount.redemption_limit == RedemptionLimit::OncePerUser {
        let redeemed = resolver
            .user_discount_usages(discount.id, ctx.user_id)
            .await?;

        if redeemed > 0 {
            return Ok(DiscountOutcome::Rejected(
                DiscountRejection::AlreadyRedeemed,
            ));
        }
    }

    let amount = compute_amount(&discount, ctx.subtotal, ctx.exchange_rate);

    Ok(DiscountOutcome::Applied { amount, discount })
}

/// Whether at least one cart line satisfies the discount's category scope,
/// including the optional narrowing to specific package ids.
fn scope_matches(discount: &Discount, lines: &[CartLine]) -> bool {
    match discount.applies_to {
        DiscountScope::All => true,
        DiscountScope::Files => lines
            .iter()
            .any(|line| DiscountScope::Files.matches_kind(line.kind())),
        DiscountScope::Packages => lines.iter().any(|line| {
            DiscountScope::Packages.matches_kind(line.kind())
                && (discount.eligible_package_ids.is_empty()
                    || discount.eligible_package_ids.contains(&line.item_id()))
        }),
    }
}

/// Computes the discount amount at full precision.
///
/// Percentage amounts are taken from the converted subtotal and capped by
/// `maximum_discount`; fixed amounts are denominated in the base currency and
/// converted like any other monetary figure. Either way the result is clamped
/// to the subtotal so a discount can never exceed the cart value. An amount
/// whose intermediate product overflows [`Decimal`] necessarily exceeds the
/// cart value too, so it saturates to the subtotal and the clamp settles it.
fn compute_amount(discount: &Discount, subtotal: Decimal, exchange_rate: Decimal) -> Decimal {
    let raw = match discount.kind {
        DiscountKind::Percentage => {
            let amount = subtotal
                .checked_mul(discount.value)
                .map_or(subtotal, |scaled| scaled / Decimal::ONE_HUNDRED);

            discount
                .maximum_discount
                .map_or(amount, |cap| amount.min(cap))
        }
        DiscountKind::Fixed => discount.value.checked_mul(exchange_rate).unwrap_or(subtotal),
    };

    raw.clamp(Decimal::ZERO, subtotal)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jiff::civil::date;
    use rustc_hash::FxHashSet;
    use testresult::TestResult;

    use crate::cache::ReferenceCache;
    use crate::cart::ItemKind;
    use crate::provider::MockDataProvider;
    use crate::resolver::CacheTtls;

    use super::*;

    fn percentage_discount() -> Discount {
        Discount {
            id: 42,
            code: "SAVE10".to_string(),
            kind: DiscountKind::Percentage,
            value: Decimal::TEN,
            minimum_amount: None,
            maximum_discount: None,
            usage_limit: None,
            targeting: UserTargeting::AllUsers,
            selected_user_ids: FxHashSet::default(),
            applies_to: DiscountScope::All,
            eligible_package_ids: FxHashSet::default(),
            payment_restriction: PaymentRestriction::All,
            allowed_payment_methods: FxHashSet::default(),
            redemption_limit: RedemptionLimit::MultiplePerUser,
            valid_from: date(2026, 1, 1),
            valid_until: None,
            active: true,
            deleted: false,
        }
    }

    fn lines() -> Vec<CartLine> {
        vec![
            CartLine::new(1, ItemKind::File, "Report.pdf", Decimal::new(1000, 2), 2)
                .unwrap_or_else(|_| unreachable!("valid line")),
        ]
    }

    fn resolver_for(discount: Discount) -> ReferenceResolver {
        let mut provider = MockDataProvider::new();

        provider
            .expect_discount_by_code()
            .returning(move |_| Ok(Some(discount.clone())));
        provider.expect_count_discount_usages().returning(|_| Ok(0));
        provider
            .expect_count_user_discount_usages()
            .returning(|_, _| Ok(0));
        provider.expect_is_first_time_user().returning(|_| Ok(true));

        ReferenceResolver::new(
            Arc::new(provider),
            Arc::new(ReferenceCache::new(64)),
            CacheTtls::default(),
        )
    }

    fn ctx<'a>(lines: &'a [CartLine], gateway: Option<&'a GatewaySelector>) -> DiscountContext<'a> {
        DiscountContext {
            lines,
            subtotal: Decimal::new(2000, 2),
            exchange_rate: Decimal::ONE,
            user_id: 7,
            gateway,
            today: date(2026, 6, 1),
        }
    }

    async fn outcome_for(discount: Discount) -> Result<DiscountOutcome, ResolveError> {
        let resolver = resolver_for(discount);
        let code: DiscountCode = "SAVE10".parse().unwrap_or_else(|_| unreachable!());
        let lines = lines();

        resolve(&resolver, &code, &ctx(&lines, None)).await
    }

    #[tokio::test]
    async fn unknown_code_rejects_with_invalid_code() -> TestResult {
        let mut provider = MockDataProvider::new();

        provider.expect_discount_by_code().returning(|_| Ok(None));

        let resolver = ReferenceResolver::new(
            Arc::new(provider),
            Arc::new(ReferenceCache::new(64)),
            CacheTtls::default(),
        );

        let code: DiscountCode = "NOPE".parse()?;
        let lines = lines();
        let outcome = resolve(&resolver, &code, &ctx(&lines, None)).await?;

        assert_eq!(
            outcome,
            DiscountOutcome::Rejected(DiscountRejection::InvalidCode)
        );

        Ok(())
    }

    #[tokio::test]
    async fn expired_discount_rejects_with_invalid_code() -> TestResult {
        let discount = Discount {
            valid_until: Some(date(2026, 5, 1)),
            ..percentage_discount()
        };

        assert_eq!(
            outcome_for(discount).await?,
            DiscountOutcome::Rejected(DiscountRejection::InvalidCode)
        );

        Ok(())
    }

    #[tokio::test]
    async fn minimum_not_met_carries_the_minimum() -> TestResult {
        let discount = Discount {
            minimum_amount: Some(Decimal::new(5000, 2)),
            ..percentage_discount()
        };

        assert_eq!(
            outcome_for(discount).await?,
            DiscountOutcome::Rejected(DiscountRejection::MinimumNotMet {
                minimum: Decimal::new(5000, 2)
            })
        );

        Ok(())
    }

    #[tokio::test]
    async fn exhausted_usage_limit_rejects() -> TestResult {
        let discount = Discount {
            usage_limit: Some(1),
            ..percentage_discount()
        };

        let mut provider = MockDataProvider::new();

        provider
            .expect_discount_by_code()
            .returning(move |_| Ok(Some(discount.clone())));
        provider.expect_count_discount_usages().returning(|_| Ok(1));

        let resolver = ReferenceResolver::new(
            Arc::new(provider),
            Arc::new(ReferenceCache::new(64)),
            CacheTtls::default(),
        );

        let code: DiscountCode = "SAVE10".parse()?;
        let lines = lines();
        let outcome = resolve(&resolver, &code, &ctx(&lines, None)).await?;

        assert_eq!(
            outcome,
            DiscountOutcome::Rejected(DiscountRejection::UsageLimitReached)
        );

        Ok(())
    }

    #[tokio::test]
    async fn selected_users_rejects_outsiders() -> TestResult {
        let discount = Discount {
            targeting: UserTargeting::SelectedUsers,
            selected_user_ids: [99].into_iter().collect(),
            ..percentage_discount()
        };

        assert_eq!(
            outcome_for(discount).await?,
            DiscountOutcome::Rejected(DiscountRejection::NotTargeted)
        );

        Ok(())
    }

    #[tokio::test]
    async fn first_time_targeting_rejects_returning_users() -> TestResult {
        let discount = Discount {
            targeting: UserTargeting::FirstTimeUsers,
            ..percentage_discount()
        };

        let mut provider = MockDataProvider::new();

        provider
            .expect_discount_by_code()
            .returning(move |_| Ok(Some(discount.clone())));
        provider.expect_is_first_time_user().returning(|_| Ok(false));

        let resolver = ReferenceResolver::new(
            Arc::new(provider),
            Arc::new(ReferenceCache::new(64)),
            CacheTtls::default(),
        );

        let code: DiscountCode = "SAVE10".parse()?;
        let lines = lines();
        let outcome = resolve(&resolver, &code, &ctx(&lines, None)).await?;

        assert_eq!(
            outcome,
            DiscountOutcome::Rejected(DiscountRejection::NotTargeted)
        );

        Ok(())
    }

    #[tokio::test]
    async fn package_scope_requires_matching_line() -> TestResult {
        let discount = Discount {
            applies_to: DiscountScope::Packages,
            ..percentage_discount()
        };

        // Cart holds only files.
        assert_eq!(
            outcome_for(discount).await?,
            DiscountOutcome::Rejected(DiscountRejection::NotApplicable)
        );

        Ok(())
    }

    #[tokio::test]
    async fn package_scope_narrowed_to_ids_requires_eligible_package() -> TestResult {
        let discount = Discount {
            applies_to: DiscountScope::Packages,
            eligible_package_ids: [500].into_iter().collect(),
            ..percentage_discount()
        };

        let resolver = resolver_for(discount.clone());
        let code: DiscountCode = "SAVE10".parse()?;

        let ineligible = vec![CartLine::new(
            400,
            ItemKind::Package,
            "Starter",
            Decimal::new(1000, 2),
            1,
        )?];

        let outcome = resolve(&resolver, &code, &ctx(&ineligible, None)).await?;

        assert_eq!(
            outcome,
            DiscountOutcome::Rejected(DiscountRejection::NotApplicable)
        );

        let resolver = resolver_for(discount);

        let eligible = vec![CartLine::new(
            500,
            ItemKind::Package,
            "Pro",
            Decimal::new(1000, 2),
            1,
        )?];

        let outcome = resolve(&resolver, &code, &ctx(&eligible, None)).await?;

        assert!(
            matches!(outcome, DiscountOutcome::Applied { .. }),
            "eligible package should pass"
        );

        Ok(())
    }

    #[tokio::test]
    async fn payment_restriction_requires_allowed_gateway() -> TestResult {
        let discount = Discount {
            payment_restriction: PaymentRestriction::Selected,
            allowed_payment_methods: ["stripe".to_string()].into_iter().collect(),
            ..percentage_discount()
        };

        // No gateway selected at all.
        assert_eq!(
            outcome_for(discount.clone()).await?,
            DiscountOutcome::Rejected(DiscountRejection::PaymentMethodNotAllowed)
        );

        let resolver = resolver_for(discount.clone());
        let code: DiscountCode = "SAVE10".parse()?;
        let lines = lines();

        let paypal: GatewaySelector = "paypal".parse()?;
        let outcome = resolve(&resolver, &code, &ctx(&lines, Some(&paypal))).await?;

        assert_eq!(
            outcome,
            DiscountOutcome::Rejected(DiscountRejection::PaymentMethodNotAllowed)
        );

        let resolver = resolver_for(discount);
        let stripe: GatewaySelector = "stripe".parse()?;
        let outcome = resolve(&resolver, &code, &ctx(&lines, Some(&stripe))).await?;

        assert!(
            matches!(outcome, DiscountOutcome::Applied { .. }),
            "allowed gateway should pass"
        );

        Ok(())
    }

    #[tokio::test]
    async fn once_per_user_rejects_repeat_redemption() -> TestResult {
        let discount = Discount {
            redemption_limit: RedemptionLimit::OncePerUser,
            ..percentage_discount()
        };

        let mut provider = MockDataProvider::new();

        provider
            .expect_discount_by_code()
            .returning(move |_| Ok(Some(discount.clone())));
        provider
            .expect_count_user_discount_usages()
            .returning(|_, _| Ok(1));

        let resolver = ReferenceResolver::new(
            Arc::new(provider),
            Arc::new(ReferenceCache::new(64)),
            CacheTtls::default(),
        );

        let code: DiscountCode = "SAVE10".parse()?;
        let lines = lines();
        let outcome = resolve(&resolver, &code, &ctx(&lines, None)).await?;

        assert_eq!(
            outcome,
            DiscountOutcome::Rejected(DiscountRejection::AlreadyRedeemed)
        );

        Ok(())
    }

    #[tokio::test]
    async fn percentage_amount_respects_maximum_discount() -> TestResult {
        let discount = Discount {
            maximum_discount: Some(Decimal::new(100, 2)),
            ..percentage_discount()
        };

        let outcome = outcome_for(discount).await?;

        // 10% of 20.00 is 2.00, capped at 1.00.
        assert!(
            matches!(outcome, DiscountOutcome::Applied { amount, .. } if amount == Decimal::new(100, 2)),
            "expected capped amount, got {outcome:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn fixed_amount_is_converted_by_the_exchange_rate() -> TestResult {
        let discount = Discount {
            kind: DiscountKind::Fixed,
            value: Decimal::new(500, 2),
            ..percentage_discount()
        };

        let resolver = resolver_for(discount);
        let code: DiscountCode = "SAVE10".parse()?;
        let lines = lines();

        let context = DiscountContext {
            exchange_rate: Decimal::new(9, 1),
            ..ctx(&lines, None)
        };

        let outcome = resolve(&resolver, &code, &context).await?;

        // 5.00 base currency at rate 0.9 -> 4.50.
        assert!(
            matches!(outcome, DiscountOutcome::Applied { amount, .. } if amount == Decimal::new(450, 2)),
            "expected converted fixed amount, got {outcome:?}"
        );

        Ok(())
    }

    #[test]
    fn fixed_amount_larger_than_cart_is_clamped_to_subtotal() {
        let discount = Discount {
            kind: DiscountKind::Fixed,
            value: Decimal::new(9900, 2),
            ..percentage_discount()
        };

        let amount = compute_amount(&discount, Decimal::new(2000, 2), Decimal::ONE);

        assert_eq!(amount, Decimal::new(2000, 2));
    }

    #[test]
    fn extreme_percentage_value_clamps_to_subtotal() {
        let discount = Discount {
            value: Decimal::MAX,
            ..percentage_discount()
        };

        let subtotal = Decimal::new(2000, 2);
        let amount = compute_amount(&discount, subtotal, Decimal::ONE);

        assert_eq!(amount, subtotal);
    }

    #[test]
    fn extreme_fixed_value_clamps_to_subtotal() {
        let discount = Discount {
            kind: DiscountKind::Fixed,
            value: Decimal::MAX,
            ..percentage_discount()
        };

        let subtotal = Decimal::new(2000, 2);
        let amount = compute_amount(&discount, subtotal, Decimal::MAX);

        assert_eq!(amount, subtotal);
    }

    #[test]
    fn rejection_codes_are_stable() {
        assert_eq!(DiscountRejection::InvalidCode.code(), "InvalidCode");
        assert_eq!(
            DiscountRejection::MinimumNotMet {
                minimum: Decimal::ONE
            }
            .code(),
            "MinimumNotMet"
        );
        assert_eq!(
            DiscountRejection::UsageLimitReached.code(),
            "UsageLimitReached"
        );
    }
}
