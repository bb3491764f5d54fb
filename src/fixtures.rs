//! In-memory reference data for tests and local experimentation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::provider::{DataProvider, Discount, ProviderError, TaxRule};

/// A [`DataProvider`] backed by in-memory maps, populated builder-style.
///
/// Lookups are infallible; use a mock when a test needs provider errors.
#[derive(Debug, Clone)]
pub struct FixtureProvider {
    base_currency: String,
    rates: FxHashMap<String, Decimal>,
    discounts: FxHashMap<String, Discount>,
    usage_counts: FxHashMap<u64, u64>,
    user_usages: FxHashMap<(u64, u64), u64>,
    first_time_users: FxHashSet<u64>,
    general_rules: Vec<TaxRule>,
    gateway_rules: FxHashMap<i64, Vec<TaxRule>>,
    gateway_ids: FxHashMap<String, i64>,
}

impl Default for FixtureProvider {
    fn default() -> Self {
        Self {
            base_currency: "USD".to_string(),
            rates: FxHashMap::default(),
            discounts: FxHashMap::default(),
            usage_counts: FxHashMap::default(),
            user_usages: FxHashMap::default(),
            first_time_users: FxHashSet::default(),
            general_rules: Vec::new(),
            gateway_rules: FxHashMap::default(),
            gateway_ids: FxHashMap::default(),
        }
    }
}

impl FixtureProvider {
    /// A provider with base currency `USD` and no other data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base currency.
    #[must_use]
    pub fn with_base_currency(mut self, code: &str) -> Self {
        self.base_currency = code.to_string();
        self
    }

    /// Adds an exchange rate from the base currency.
    #[must_use]
    pub fn with_rate(mut self, code: &str, rate: Decimal) -> Self {
        self.rates.insert(code.to_string(), rate);
        self
    }

    /// Adds a discount, keyed by its code.
    #[must_use]
    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discounts.insert(discount.code.clone(), discount);
        self
    }

    /// Sets the global redemption count for a discount.
    #[must_use]
    pub fn with_usage_count(mut self, discount_id: u64, count: u64) -> Self {
        self.usage_counts.insert(discount_id, count);
        self
    }

    /// Sets one user's redemption count for a discount.
    #[must_use]
    pub fn with_user_usage(mut self, discount_id: u64, user_id: u64, count: u64) -> Self {
        self.user_usages.insert((discount_id, user_id), count);
        self
    }

    /// Marks a user as having no prior completed orders.
    #[must_use]
    pub fn with_first_time_user(mut self, user_id: u64) -> Self {
        self.first_time_users.insert(user_id);
        self
    }

    /// Adds a tax rule applied to every calculation.
    #[must_use]
    pub fn with_general_tax_rule(mut self, rule: TaxRule) -> Self {
        self.general_rules.push(rule);
        self
    }

    /// Registers a gateway selector under a numeric id.
    #[must_use]
    pub fn with_gateway(mut self, selector: &str, id: i64) -> Self {
        self.gateway_ids.insert(selector.to_string(), id);
        self
    }

    /// Adds a tax rule scoped to one gateway.
    #[must_use]
    pub fn with_gateway_tax_rule(mut self, gateway_id: i64, rule: TaxRule) -> Self {
        self.gateway_rules.entry(gateway_id).or_default().push(rule);
        self
    }
}

#[async_trait]
impl DataProvider for FixtureProvider {
    async fn base_currency(&self) -> Result<String, ProviderError> {
        Ok(self.base_currency.clone())
    }

    async fn exchange_rate(&self, code: &str) -> Result<Option<Decimal>, ProviderError> {
        Ok(self.rates.get(code).copied())
    }

    async fn discount_by_code(&self, code: &str) -> Result<Option<Discount>, ProviderError> {
        Ok(self.discounts.get(code).cloned())
    }

    async fn count_discount_usages(&self, discount_id: u64) -> Result<u64, ProviderError> {
        Ok(self.usage_counts.get(&discount_id).copied().unwrap_or(0))
    }

    async fn count_user_discount_usages(
        &self,
        discount_id: u64,
        user_id: u64,
    ) -> Result<u64, ProviderError> {
        Ok(self
            .user_usages
            .get(&(discount_id, user_id))
            .copied()
            .unwrap_or(0))
    }

    async fn is_first_time_user(&self, user_id: u64) -> Result<bool, ProviderError> {
        Ok(self.first_time_users.contains(&user_id))
    }

    async fn general_tax_rules(&self) -> Result<Vec<TaxRule>, ProviderError> {
        Ok(self.general_rules.clone())
    }

    async fn gateway_tax_rules(&self, gateway_id: i64) -> Result<Vec<TaxRule>, ProviderError> {
        Ok(self
            .gateway_rules
            .get(&gateway_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_gateway_id(&self, gateway: &str) -> Result<Option<i64>, ProviderError> {
        Ok(self.gateway_ids.get(gateway).copied())
    }
}
