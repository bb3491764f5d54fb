//! Reference data provider
//!
//! The engine's one external collaborator: a read-only view over the backing
//! store. Everything here is reference data fetched per calculation; the
//! engine never writes through this seam.

use async_trait::async_trait;
use jiff::civil::Date;
use mockall::automock;
use rust_decimal::Decimal;
use rustc_hash::FxHashSet;
use serde::Serialize;
use thiserror::Error;

use crate::cart::ItemKind;

/// Errors surfaced by the backing store.
///
/// A fetch timeout is an ordinary failure here; the query layer owns the
/// deadline and the engine treats the result like any other unavailable read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The backing store could not serve the read.
    #[error("reference data store unavailable: {0}")]
    Unavailable(String),

    /// The read exceeded the query layer's deadline.
    #[error("reference data fetch timed out")]
    Timeout,
}

/// How a discount's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    /// `value` is a percentage of the converted subtotal.
    Percentage,

    /// `value` is a fixed amount in the store's base currency.
    Fixed,
}

/// Which users a discount targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTargeting {
    /// Any caller qualifies.
    AllUsers,

    /// Only callers with no prior completed orders qualify.
    FirstTimeUsers,

    /// Only callers listed in `selected_user_ids` qualify.
    SelectedUsers,
}

/// Which catalog categories a discount applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountScope {
    /// Applies to every line.
    All,

    /// Requires at least one digital-file line (files or folders).
    Files,

    /// Requires at least one subscription-package line.
    Packages,
}

impl DiscountScope {
    /// Whether a cart line of the given kind falls inside this scope.
    pub fn matches_kind(self, kind: ItemKind) -> bool {
        match self {
            Self::All => true,
            Self::Files => matches!(kind, ItemKind::File | ItemKind::Folder),
            Self::Packages => kind == ItemKind::Package,
        }
    }
}

/// Whether a discount is restricted to specific payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentRestriction {
    /// Usable with any gateway.
    All,

    /// Usable only with gateways listed in `allowed_payment_methods`.
    Selected,
}

/// How many times one user may redeem a discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionLimit {
    /// No per-user cap.
    MultiplePerUser,

    /// One redemption per user, ever.
    OncePerUser,
}

/// A discount record as stored.
///
/// Immutable reference data; the eligibility pipeline in
/// [`crate::discounts`] re-checks validity rather than trusting the store to
/// filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Discount {
    /// Storage id, used for usage-count lookups.
    pub id: u64,

    /// Unique code, matched case-insensitively.
    pub code: String,

    /// Percentage or fixed amount.
    pub kind: DiscountKind,

    /// Percentage points or base-currency amount, per `kind`.
    pub value: Decimal,

    /// Minimum converted subtotal required, if any.
    pub minimum_amount: Option<Decimal>,

    /// Cap on the computed amount; only meaningful for percentage discounts.
    pub maximum_discount: Option<Decimal>,

    /// Global redemption cap across all users, if any.
    pub usage_limit: Option<u64>,

    /// Which users qualify.
    pub targeting: UserTargeting,

    /// Member set for [`UserTargeting::SelectedUsers`].
    pub selected_user_ids: FxHashSet<u64>,

    /// Which catalog categories qualify.
    pub applies_to: DiscountScope,

    /// Narrowing set of package ids for [`DiscountScope::Packages`]; empty
    /// means any package qualifies.
    pub eligible_package_ids: FxHashSet<u64>,

    /// Whether payment methods are restricted.
    pub payment_restriction: PaymentRestriction,

    /// Allowed gateway selectors for [`PaymentRestriction::Selected`].
    pub allowed_payment_methods: FxHashSet<String>,

    /// Per-user redemption cap.
    pub redemption_limit: RedemptionLimit,

    /// First day the discount is valid.
    pub valid_from: Date,

    /// Last day the discount is valid; `None` is open-ended.
    pub valid_until: Option<Date>,

    /// Whether the discount is switched on.
    pub active: bool,

    /// Soft-delete marker.
    pub deleted: bool,
}

impl Discount {
    /// Whether the discount is live on the given date: active, not
    /// soft-deleted, and inside its validity window.
    pub fn is_live(&self, today: Date) -> bool {
        self.active
            && !self.deleted
            && self.valid_from <= today
            && self.valid_until.is_none_or(|until| today <= until)
    }
}

/// How a tax rule's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxRuleKind {
    /// `value` is a percentage of the taxable base.
    Percentage,

    /// `value` is a flat amount in the target currency.
    Fixed,
}

/// Scope of a tax rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxScope {
    /// Applies to every calculation.
    General,

    /// Applies only when the matching gateway is selected.
    Gateway,
}

/// A tax rule as stored.
///
/// `value` is kept as the store's raw string: rows with unparsable values are
/// a known data-quality hazard and the calculator skips them per rule instead
/// of failing the checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxRule {
    /// Storage id.
    pub id: u64,

    /// Display name, echoed into the tax breakdown.
    pub name: String,

    /// Percentage or fixed amount.
    pub kind: TaxRuleKind,

    /// Raw stored value, parsed at calculation time.
    pub value: String,

    /// General or gateway-specific.
    pub scope: TaxScope,

    /// Gateway numeric id; required when `scope` is [`TaxScope::Gateway`].
    pub gateway_id: Option<i64>,
}

/// Read operations the engine needs from the backing store.
///
/// Implementations must be safe to share across concurrent calculations. The
/// engine only calls these through the caching resolver, so a slow
/// implementation is amortized across the TTL window.
#[automock]
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// The store's configured base currency code.
    async fn base_currency(&self) -> Result<String, ProviderError>;

    /// Exchange rate from the base currency to `code`, if a row exists.
    async fn exchange_rate(&self, code: &str) -> Result<Option<Decimal>, ProviderError>;

    /// Discount record for a normalized code, if one exists.
    async fn discount_by_code(&self, code: &str) -> Result<Option<Discount>, ProviderError>;

    /// Total recorded redemptions of a discount across all users.
    async fn count_discount_usages(&self, discount_id: u64) -> Result<u64, ProviderError>;

    /// Recorded redemptions of a discount by one user.
    async fn count_user_discount_usages(
        &self,
        discount_id: u64,
        user_id: u64,
    ) -> Result<u64, ProviderError>;

    /// Whether the user has no prior completed orders.
    async fn is_first_time_user(&self, user_id: u64) -> Result<bool, ProviderError>;

    /// Tax rules that apply to every calculation.
    async fn general_tax_rules(&self) -> Result<Vec<TaxRule>, ProviderError>;

    /// Tax rules scoped to one gateway.
    async fn gateway_tax_rules(&self, gateway_id: i64) -> Result<Vec<TaxRule>, ProviderError>;

    /// Numeric id for a gateway selector, if the gateway is known.
    async fn resolve_gateway_id(&self, gateway: &str) -> Result<Option<i64>, ProviderError>;
}
