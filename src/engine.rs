//! Pricing engine
//!
//! The orchestrator behind [`PricingEngine::calculate_cart_total`]: admit
//! through the gate, sanitize inputs, resolve reference data, price, run the
//! discount pipeline, tax, and assemble the receipt. The engine owns the
//! cache, the gate, and the metrics sink, plus the background tasks that keep
//! the cache swept and (optionally) the counters windowed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jiff::Zoned;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::ReferenceCache;
use crate::cart::CartLine;
use crate::discounts::{self, DiscountContext, DiscountOutcome};
use crate::gate::{ConcurrencyGate, Overloaded};
use crate::inputs::{CurrencyCode, DiscountCode, GatewaySelector, InputError};
use crate::metrics::{EngineMetrics, HealthReport, HealthStatus, MetricsSnapshot};
use crate::pricing::{self, PricingError};
use crate::provider::DataProvider;
use crate::receipt::{self, Receipt, ReceiptMetadata};
use crate::resolver::{CacheTtls, ReferenceResolver, ResolveError};
use crate::tax;

/// One cart calculation, as supplied by the caller.
///
/// Identifier fields are raw strings; the engine sanitizes them before any
/// reference-data access.
#[derive(Debug, Clone)]
pub struct CalculationRequest {
    /// Validated cart lines.
    pub lines: Vec<CartLine>,

    /// Target currency code.
    pub currency: String,

    /// Discount code to redeem, if any.
    pub discount_code: Option<String>,

    /// The caller's identity; never inferred from ambient state.
    pub user_id: u64,

    /// Selected payment gateway, if any.
    pub gateway: Option<String>,
}

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Ceiling on simultaneous calculations.
    pub max_concurrent_calculations: usize,

    /// Ceiling on cart lines per request.
    pub max_cart_lines: usize,

    /// Cache capacity in entries.
    pub cache_capacity: usize,

    /// Per-class cache TTLs.
    pub ttls: CacheTtls,

    /// How often expired cache entries are swept. Zero disables the sweep.
    pub sweep_interval: Duration,

    /// Window after which metrics counters reset, if set.
    pub metrics_reset_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calculations: 100,
            max_cart_lines: 100,
            cache_capacity: 1024,
            ttls: CacheTtls::default(),
            sweep_interval: Duration::from_secs(60),
            metrics_reset_interval: None,
        }
    }
}

/// Request-shape failures, caught before any reference-data access.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The cart exceeds the configured line ceiling.
    #[error("cart has {count} lines; the maximum is {max}")]
    TooManyLines {
        /// Lines in the request.
        count: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// An identifier failed sanitization.
    #[error(transparent)]
    Input(#[from] InputError),
}

/// Hard failures from one calculation.
///
/// A rejected discount is not represented here; it comes back as a receipt
/// with `success` unset.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The gate turned the request away.
    #[error(transparent)]
    Overloaded(#[from] Overloaded),

    /// The request failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Reference data could not be resolved.
    #[error(transparent)]
    Reference(#[from] ResolveError),

    /// A calculation-integrity invariant was violated.
    #[error(transparent)]
    Integrity(#[from] PricingError),
}

impl From<InputError> for EngineError {
    fn from(error: InputError) -> Self {
        Self::Validation(ValidationError::Input(error))
    }
}

/// The cart pricing engine.
///
/// Cheap to share behind an [`Arc`]; every public method takes `&self`.
#[derive(Debug)]
pub struct PricingEngine {
    resolver: ReferenceResolver,
    cache: Arc<ReferenceCache>,
    gate: ConcurrencyGate,
    metrics: Arc<EngineMetrics>,
    max_cart_lines: usize,
    background: Vec<JoinHandle<()>>,
}

impl PricingEngine {
    /// Creates an engine over the given provider and starts its background
    /// tasks. Must be called from within a tokio runtime.
    pub fn new(provider: Arc<dyn DataProvider>, config: EngineConfig) -> Self {
        let cache = Arc::new(ReferenceCache::new(config.cache_capacity));
        let metrics = Arc::new(EngineMetrics::default());
        let mut background = Vec::new();

        if !config.sweep_interval.is_zero() {
            let sweep_cache = Arc::clone(&cache);
            let period = config.sweep_interval;

            background.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);

                // The first tick fires immediately; skip it.
                ticker.tick().await;

                loop {
                    ticker.tick().await;
                    sweep_cache.sweep();
                }
            }));
        }

        if let Some(window) = config.metrics_reset_interval
            && !window.is_zero()
        {
            let reset_metrics = Arc::clone(&metrics);
            let reset_cache = Arc::clone(&cache);

            background.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(window);

                ticker.tick().await;

                loop {
                    ticker.tick().await;
                    reset_metrics.reset();
                    reset_cache.reset_counters();
                }
            }));
        }

        Self {
            resolver: ReferenceResolver::new(provider, Arc::clone(&cache), config.ttls),
            cache,
            gate: ConcurrencyGate::new(config.max_concurrent_calculations),
            metrics,
            max_cart_lines: config.max_cart_lines,
            background,
        }
    }

    /// Prices a cart end to end.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] for overload, validation, reference-data,
    /// and integrity failures. Discount rejections are successful calls whose
    /// receipt carries `success: false` and a reason.
    #[tracing::instrument(
        name = "calculate_cart_total",
        skip(self, request),
        fields(
            user_id = request.user_id,
            lines = request.lines.len(),
            calculation_id = tracing::field::Empty,
        ),
        err
    )]
    pub async fn calculate_cart_total(
        &self,
        request: &CalculationRequest,
    ) -> Result<Receipt, EngineError> {
        let _permit = self.gate.admit()?;

        let calculation_id = Uuid::new_v4();

        tracing::Span::current().record(
            "calculation_id",
            tracing::field::display(calculation_id),
        );

        let started = Instant::now();
        let result = self.run(request, calculation_id, started).await;

        self.metrics.record(started.elapsed(), result.is_err());

        result
    }

    /// Current metrics counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.cache.stats())
    }

    /// Health classification derived from the current counters.
    #[must_use]
    pub fn health_check(&self) -> HealthReport {
        let metrics = self.metrics();

        HealthReport {
            status: HealthStatus::classify(&metrics),
            metrics,
        }
    }

    /// Invalidates cache entries whose key starts with `pattern`, or the
    /// whole cache when `pattern` is `None`. For use after external mutation
    /// of discount, tax, or rate data.
    pub fn clear_cache(&self, pattern: Option<&str>) {
        self.cache.clear(pattern);
    }

    /// Calculation slots currently free.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.gate.available()
    }

    /// Stops the background sweep and reset tasks. Also happens on drop;
    /// calling it early makes teardown explicit.
    pub fn shutdown(&mut self) {
        for task in self.background.drain(..) {
            task.abort();
        }
    }

    async fn run(
        &self,
        request: &CalculationRequest,
        calculation_id: Uuid,
        started: Instant,
    ) -> Result<Receipt, EngineError> {
        let (currency, code, gateway) = self.validate(request)?;

        let rate = self.resolver.exchange_rate(&currency).await?;
        let subtotal = pricing::converted_subtotal(&request.lines, rate)?;

        let outcome = match &code {
            None => DiscountOutcome::NotRequested,
            Some(code) => {
                let ctx = DiscountContext {
                    lines: &request.lines,
                    subtotal,
                    exchange_rate: rate,
                    user_id: request.user_id,
                    gateway: gateway.as_ref(),
                    today: Zoned::now().date(),
                };

                discounts::resolve(&self.resolver, code, &ctx).await?
            }
        };

        let discount_amount = match &outcome {
            DiscountOutcome::Applied { amount, .. } => *amount,
            _ => Decimal::ZERO,
        };

        let taxable = subtotal - discount_amount;
        let rules = self.tax_rules(gateway.as_ref()).await?;
        let assessment = tax::assess(&rules, taxable);

        let metadata = ReceiptMetadata {
            calculation_id,
            duration_micros: u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
            cache: self.cache.stats(),
        };

        let receipt = receipt::assemble(&currency, rate, subtotal, &outcome, assessment, metadata);

        info!(
            success = receipt.success,
            total = %receipt.total,
            discount = %receipt.discount.amount,
            "calculation complete"
        );

        Ok(receipt)
    }

    /// Sanitizes the request's identifiers and enforces the line ceiling.
    fn validate(
        &self,
        request: &CalculationRequest,
    ) -> Result<(CurrencyCode, Option<DiscountCode>, Option<GatewaySelector>), ValidationError>
    {
        if request.lines.len() > self.max_cart_lines {
            return Err(ValidationError::TooManyLines {
                count: request.lines.len(),
                max: self.max_cart_lines,
            });
        }

        let currency = request.currency.parse::<CurrencyCode>()?;

        let code = request
            .discount_code
            .as_deref()
            .map(str::parse::<DiscountCode>)
            .transpose()?;

        let gateway = request
            .gateway
            .as_deref()
            .map(str::parse::<GatewaySelector>)
            .transpose()?;

        Ok((currency, code, gateway))
    }

    /// General tax rules plus the selected gateway's, when the gateway is
    /// known. An unresolvable selector contributes no gateway taxes rather
    /// than failing the calculation.
    async fn tax_rules(
        &self,
        gateway: Option<&GatewaySelector>,
    ) -> Result<Vec<crate::provider::TaxRule>, ResolveError> {
        let mut rules = self.resolver.general_tax_rules().await?;

        if let Some(gateway) = gateway {
            match self.resolver.gateway_id(gateway).await? {
                Some(id) => rules.extend(self.resolver.gateway_tax_rules(id).await?),
                None => {
                    debug!(%gateway, "gateway selector not recognized; skipping gateway taxes");
                }
            }
        }

        Ok(rules)
    }
}

impl Drop for PricingEngine {
    fn drop(&mut self) {
        for task in &self.background {
            task.abort();
        }
    }
}
