//! Tax calculator
//!
//! Applies general and gateway-scoped tax rules to the post-discount amount.
//! Accumulation keeps full precision so rounding error cannot compound across
//! rules; the receipt rounds once at the boundary. Rules whose stored value
//! does not parse are skipped and logged as data-quality issues rather than
//! failing the checkout.

use rust_decimal::Decimal;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::warn;

use crate::provider::{TaxRule, TaxRuleKind};

/// One applied tax rule in the breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxLineItem {
    /// Storage id of the rule.
    pub id: u64,

    /// Display name of the rule.
    pub name: String,

    /// Percentage or fixed.
    pub kind: TaxRuleKind,

    /// The amount this rule contributed, in the target currency.
    pub amount: Decimal,
}

/// Full-precision result of applying a rule set to a taxable base.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TaxAssessment {
    /// Sum of all contributions, full precision.
    pub total: Decimal,

    /// Per-rule contributions in application order.
    pub breakdown: SmallVec<[TaxLineItem; 4]>,
}

/// Applies every rule to the taxable base.
///
/// Percentage rules contribute `taxable * value / 100`; fixed rules
/// contribute their value as-is (already in the target currency). A rule
/// whose contribution leaves [`Decimal`] range is treated like an unparsable
/// one: skipped and logged, never a panic.
pub(crate) fn assess(rules: &[TaxRule], taxable: Decimal) -> TaxAssessment {
    let mut total = Decimal::ZERO;
    let mut breakdown = SmallVec::new();

    for rule in rules {
        let Ok(value) = rule.value.trim().parse::<Decimal>() else {
            warn!(
                rule_id = rule.id,
                rule_name = %rule.name,
                raw_value = %rule.value,
                "skipping tax rule with unparsable value"
            );

            continue;
        };

        let contribution = match rule.kind {
            TaxRuleKind::Percentage => taxable
                .checked_mul(value)
                .map(|scaled| scaled / Decimal::ONE_HUNDRED),
            TaxRuleKind::Fixed => Some(value),
        };

        let Some(amount) = contribution else {
            warn!(
                rule_id = rule.id,
                rule_name = %rule.name,
                raw_value = %rule.value,
                "skipping tax rule with out-of-range value"
            );

            continue;
        };

        let Some(next_total) = total.checked_add(amount) else {
            warn!(
                rule_id = rule.id,
                rule_name = %rule.name,
                raw_value = %rule.value,
                "skipping tax rule that overflows the accumulated total"
            );

            continue;
        };

        total = next_total;

        breakdown.push(TaxLineItem {
            id: rule.id,
            name: rule.name.clone(),
            kind: rule.kind,
            amount,
        });
    }

    TaxAssessment { total, breakdown }
}
