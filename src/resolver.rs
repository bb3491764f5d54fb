//! Reference data resolver
//!
//! Typed accessors over the [`DataProvider`], each wrapping a cache lookup
//! with its class's TTL. Inputs are sanitized before a cache key is built, so
//! the keyspace only ever contains normalized identifiers.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::cache::{CachedValue, ReferenceCache};
use crate::inputs::{CurrencyCode, DiscountCode, GatewaySelector};
use crate::provider::{DataProvider, Discount, ProviderError, TaxRule};

/// Time-to-live per reference-data class.
///
/// Staleness within a window is an accepted tradeoff; the classes are sized
/// by how often each data set changes in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Exchange rates and the base-currency code.
    pub exchange_rates: Duration,

    /// Discount records, usage counts, and first-time-user flags.
    pub discounts: Duration,

    /// Tax rule sets.
    pub taxes: Duration,

    /// Gateway selector to numeric id mapping.
    pub gateways: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            exchange_rates: Duration::from_secs(5 * 60),
            discounts: Duration::from_secs(2 * 60),
            taxes: Duration::from_secs(10 * 60),
            gateways: Duration::from_secs(15 * 60),
        }
    }
}

/// Errors raised while resolving reference data.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No exchange-rate row exists for the requested currency. There is no
    /// safe default rate, so the whole calculation fails.
    #[error("no exchange rate found for currency {0}")]
    CurrencyNotFound(String),

    /// The stored rate is unusable (zero or negative).
    #[error("exchange rate for {code} is not positive: {rate}")]
    InvalidExchangeRate {
        /// The requested currency.
        code: String,
        /// The offending stored rate.
        rate: Decimal,
    },

    /// The store's configured base currency is not a valid code.
    #[error("store base currency {0:?} is malformed")]
    MalformedBaseCurrency(String),

    /// The backing store failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A cached value had a different shape than the accessor stored. This
    /// indicates key reuse across classes, which the key scheme rules out.
    #[error("cached value under {key} has an unexpected shape")]
    CacheShape {
        /// The offending cache key.
        key: String,
    },
}

/// Caching accessors for every reference-data type the engine reads.
///
/// Stateless apart from delegating to the shared cache, so it is cheap to
/// call from any number of concurrent calculations.
#[derive(Clone)]
pub(crate) struct ReferenceResolver {
    provider: Arc<dyn DataProvider>,
    cache: Arc<ReferenceCache>,
    ttls: CacheTtls,
}

impl std::fmt::Debug for ReferenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field("cache", &self.cache)
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

impl ReferenceResolver {
    pub(crate) fn new(
        provider: Arc<dyn DataProvider>,
        cache: Arc<ReferenceCache>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            provider,
            cache,
            ttls,
        }
    }

    /// The store's configured base currency.
    pub(crate) async fn base_currency(&self) -> Result<CurrencyCode, ResolveError> {
        let key = "currency:base".to_string();
        let provider = Arc::clone(&self.provider);

        let value = self
            .cache
            .get_or_load(key.clone(), self.ttls.exchange_rates, || async move {
                provider.base_currency().await.map(CachedValue::Code)
            })
            .await?;

        match value {
            CachedValue::Code(code) => match code.parse::<CurrencyCode>() {
                Ok(parsed) => Ok(parsed),
                Err(_) => Err(ResolveError::MalformedBaseCurrency(code)),
            },
            _ => Err(ResolveError::CacheShape { key }),
        }
    }

    /// Exchange rate from the base currency to `code`.
    ///
    /// The base currency always resolves to exactly 1 without touching the
    /// rate table, so a stale self-referential row can never skew it.
    pub(crate) async fn exchange_rate(&self, code: &CurrencyCode) -> Result<Decimal, ResolveError> {
        let base = self.base_currency().await?;

        if *code == base {
            return Ok(Decimal::ONE);
        }

        let key = format!("rate:{code}");
        let provider = Arc::clone(&self.provider);
        let lookup = code.as_str().to_string();

        let value = self
            .cache
            .get_or_load(key.clone(), self.ttls.exchange_rates, || async move {
                provider.exchange_rate(&lookup).await.map(CachedValue::Rate)
            })
            .await?;

        match value {
            CachedValue::Rate(Some(rate)) if rate > Decimal::ZERO => Ok(rate),
            CachedValue::Rate(Some(rate)) => Err(ResolveError::InvalidExchangeRate {
                code: code.to_string(),
                rate,
            }),
            CachedValue::Rate(None) => Err(ResolveError::CurrencyNotFound(code.to_string())),
            _ => Err(ResolveError::CacheShape { key }),
        }
    }

    /// Discount record for a sanitized code, if one exists.
    pub(crate) async fn discount(
        &self,
        code: &DiscountCode,
    ) -> Result<Option<Discount>, ResolveError> {
        let key = format!("discount:{code}");
        let provider = Arc::clone(&self.provider);
        let lookup = code.as_str().to_string();

        let value = self
            .cache
            .get_or_load(key.clone(), self.ttls.discounts, || async move {
                provider
                    .discount_by_code(&lookup)
                    .await
                    .map(|found| CachedValue::Discount(found.map(Box::new)))
            })
            .await?;

        match value {
            CachedValue::Discount(found) => Ok(found.map(|boxed| *boxed)),
            _ => Err(ResolveError::CacheShape { key }),
        }
    }

    /// Total recorded redemptions of a discount.
    pub(crate) async fn discount_usages(&self, discount_id: u64) -> Result<u64, ResolveError> {
        let key = format!("usage:{discount_id}");
        let provider = Arc::clone(&self.provider);

        let value = self
            .cache
            .get_or_load(key.clone(), self.ttls.discounts, || async move {
                provider
                    .count_discount_usages(discount_id)
                    .await
                    .map(CachedValue::Count)
            })
            .await?;

        match value {
            CachedValue::Count(count) => Ok(count),
            _ => Err(ResolveError::CacheShape { key }),
        }
    }

    /// Recorded redemptions of a discount by one user.
    pub(crate) async fn user_discount_usages(
        &self,
        discount_id: u64,
        user_id: u64,
    ) -> Result<u64, ResolveError> {
        let key = format!("usage:{discount_id}:user:{user_id}");
        let provider = Arc::clone(&self.provider);

        let value = self
            .cache
            .get_or_load(key.clone(), self.ttls.discounts, || async move {
                provider
                    .count_user_discount_usages(discount_id, user_id)
                    .await
                    .map(CachedValue::Count)
            })
            .await?;

        match value {
            CachedValue::Count(count) => Ok(count),
            _ => Err(ResolveError::CacheShape { key }),
        }
    }

    /// Whether the user has no prior completed orders.
    pub(crate) async fn first_time_user(&self, user_id: u64) -> Result<bool, ResolveError> {
        let key = format!("first_time:{user_id}");
        let provider = Arc::clone(&self.provider);

        let value = self
            .cache
            .get_or_load(key.clone(), self.ttls.discounts, || async move {
                provider
                    .is_first_time_user(user_id)
                    .await
                    .map(CachedValue::Flag)
            })
            .await?;

        match value {
            CachedValue::Flag(flag) => Ok(flag),
            _ => Err(ResolveError::CacheShape { key }),
        }
    }

    /// Tax rules that apply to every calculation.
    pub(crate) async fn general_tax_rules(&self) -> Result<Vec<TaxRule>, ResolveError> {
        let key = "tax:general".to_string();
        let provider = Arc::clone(&self.provider);

        let value = self
            .cache
            .get_or_load(key.clone(), self.ttls.taxes, || async move {
                provider
                    .general_tax_rules()
                    .await
                    .map(CachedValue::TaxRules)
            })
            .await?;

        match value {
            CachedValue::TaxRules(rules) => Ok(rules),
            _ => Err(ResolveError::CacheShape { key }),
        }
    }

    /// Tax rules scoped to one gateway.
    pub(crate) async fn gateway_tax_rules(
        &self,
        gateway_id: i64,
    ) -> Result<Vec<TaxRule>, ResolveError> {
        let key = format!("tax:gateway:{gateway_id}");
        let provider = Arc::clone(&self.provider);

        let value = self
            .cache
            .get_or_load(key.clone(), self.ttls.taxes, || async move {
                provider
                    .gateway_tax_rules(gateway_id)
                    .await
                    .map(CachedValue::TaxRules)
            })
            .await?;

        match value {
            CachedValue::TaxRules(rules) => Ok(rules),
            _ => Err(ResolveError::CacheShape { key }),
        }
    }

    /// Numeric id for a sanitized gateway selector, if the gateway is known.
    pub(crate) async fn gateway_id(
        &self,
        gateway: &GatewaySelector,
    ) -> Result<Option<i64>, ResolveError> {
        let key = format!("gateway:{gateway}");
        let provider = Arc::clone(&self.provider);
        let lookup = gateway.as_str().to_string();

        let value = self
            .cache
            .get_or_load(key.clone(), self.ttls.gateways, || async move {
                provider
                    .resolve_gateway_id(&lookup)
                    .await
                    .map(CachedValue::GatewayId)
            })
            .await?;

        match value {
            CachedValue::GatewayId(id) => Ok(id),
            _ => Err(ResolveError::CacheShape { key }),
        }
    }
}
