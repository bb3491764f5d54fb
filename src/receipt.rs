//! Result assembler & safety guard
//!
//! Builds the caller-facing receipt from full-precision intermediates. This
//! is the only place monetary amounts are rounded; everything upstream keeps
//! full precision so rounding error cannot compound. The guard clamps a
//! negative grand total to zero and logs it as an integrity event, since the
//! discount pipeline already clamps its amount to the subtotal.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::cache::CacheStats;
use crate::discounts::DiscountOutcome;
use crate::inputs::CurrencyCode;
use crate::pricing::round_money;
use crate::provider::DiscountKind;
use crate::tax::{TaxAssessment, TaxLineItem};

/// The discount record behind an applied discount.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountDetails {
    /// Storage id of the discount.
    pub id: u64,

    /// The sanitized code that was redeemed.
    pub code: String,

    /// Percentage or fixed.
    pub kind: DiscountKind,

    /// The configured value: a percentage, or a base-currency amount.
    pub value: Decimal,
}

/// Discount portion of the receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountSection {
    /// Amount deducted, rounded. Zero when nothing applied.
    pub amount: Decimal,

    /// The applied discount, or `null` when none applied.
    pub details: Option<DiscountDetails>,
}

/// Tax portion of the receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSection {
    /// Sum of all rule contributions, rounded.
    pub total: Decimal,

    /// Per-rule contributions in application order, each rounded.
    pub breakdown: Vec<TaxLineItem>,
}

/// Diagnostic trailer attached to every receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptMetadata {
    /// Unique id for this calculation, also present in its log spans.
    pub calculation_id: Uuid,

    /// End-to-end duration in microseconds.
    pub duration_micros: u64,

    /// Engine-level cache counters at assembly time.
    pub cache: CacheStats,
}

/// The caller-facing result of one cart calculation.
///
/// `success` is `false` only when a requested discount was rejected; the
/// monetary fields are complete and correct either way.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Whether the requested discount (if any) applied.
    pub success: bool,

    /// Target currency of all monetary fields.
    pub currency: String,

    /// Rate used to convert from the base currency.
    pub exchange_rate: Decimal,

    /// Converted cart subtotal, rounded.
    pub subtotal: Decimal,

    /// Discount amount and details.
    pub discount: DiscountSection,

    /// Tax total and breakdown.
    pub tax: TaxSection,

    /// Grand total: subtotal minus discount plus tax, rounded and clamped
    /// to zero.
    pub total: Decimal,

    /// What the caller owes. Equal to `total`.
    pub amount_due: Decimal,

    /// Human-readable rejection reason, or `null` on success.
    pub error: Option<String>,

    /// Machine-readable rejection code, or `null` on success.
    pub error_code: Option<&'static str>,

    /// Diagnostics.
    pub metadata: ReceiptMetadata,
}

/// Assembles the receipt from full-precision intermediates.
pub(crate) fn assemble(
    currency: &CurrencyCode,
    exchange_rate: Decimal,
    subtotal: Decimal,
    outcome: &DiscountOutcome,
    assessment: TaxAssessment,
    metadata: ReceiptMetadata,
) -> Receipt {
    let (success, discount_amount, details, error, error_code) = match outcome {
        DiscountOutcome::NotRequested => (true, Decimal::ZERO, None, None, None),
        DiscountOutcome::Rejected(rejection) => (
            false,
            Decimal::ZERO,
            None,
            Some(rejection.to_string()),
            Some(rejection.code()),
        ),
        DiscountOutcome::Applied { amount, discount } => (
            true,
            *amount,
            Some(DiscountDetails {
                id: discount.id,
                code: discount.code.clone(),
                kind: discount.kind,
                value: discount.value,
            }),
            None,
            None,
        ),
    };

    // The discount amount is clamped to the subtotal, so the subtraction
    // cannot overflow; an assessed tax total large enough to overflow the sum
    // saturates rather than panics.
    let raw_total = (subtotal - discount_amount)
        .checked_add(assessment.total)
        .unwrap_or(Decimal::MAX);
    let mut total = round_money(raw_total);

    if total < Decimal::ZERO {
        error!(
            calculation_id = %metadata.calculation_id,
            %total,
            integrity = true,
            "clamping negative grand total to zero"
        );

        total = Decimal::ZERO;
    }

    let breakdown = assessment
        .breakdown
        .into_iter()
        .map(|item| TaxLineItem {
            amount: round_money(item.amount),
            ..item
        })
        .collect();

    Receipt {
        success,
        currency: currency.as_str().to_string(),
        exchange_rate,
        subtotal: round_money(subtotal),
        discount: DiscountSection {
            amount: round_money(discount_amount),
            details,
        },
        tax: TaxSection {
            total: round_money(assessment.total),
            breakdown,
        },
        total,
        amount_due: total,
        error,
        error_code,
        metadata,
    }
}
