//! Exchange rates for fiat-denominated outputs.
//!
//! Rates come from a caller-supplied [`RateSource`]. [`RateCache`] wraps one
//! with a time-to-live, reading time from an injected [`Clock`] so expiry
//! can be tested without sleeping.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::WalletError;

/// How long a fetched rate stays fresh by default.
pub const DEFAULT_RATE_TTL_MS: u64 = 60_000;

const SATOSHIS_PER_BTC: f64 = 100_000_000.0;

/// Anything that can price one bitcoin in a fiat currency.
pub trait RateSource {
    /// Price of one BTC in `currency`, an upper-case ISO-4217 code.
    fn btc_price(&self, currency: &str) -> Result<f64, WalletError>;
}

/// Milliseconds since the Unix epoch.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A fixed price table. Useful offline and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRates(HashMap<String, f64>);

impl StaticRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, currency: &str, btc_price: f64) -> Self {
        self.0.insert(currency.to_ascii_uppercase(), btc_price);
        self
    }
}

impl RateSource for StaticRates {
    fn btc_price(&self, currency: &str) -> Result<f64, WalletError> {
        self.0
            .get(currency)
            .copied()
            .ok_or_else(|| WalletError::RateUnavailable(format!("no rate for {currency}")))
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    price: f64,
    fetched_at: u64,
}

/// TTL cache in front of a [`RateSource`].
pub struct RateCache<S, C = SystemClock> {
    source: S,
    clock: C,
    ttl_ms: u64,
    entries: Mutex<HashMap<String, CachedRate>>,
}

impl<S: RateSource> RateCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_clock(source, SystemClock, DEFAULT_RATE_TTL_MS)
    }
}

impl<S: RateSource, C: Clock> RateCache<S, C> {
    pub fn with_clock(source: S, clock: C, ttl_ms: u64) -> Self {
        Self {
            source,
            clock,
            ttl_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Drop every cached rate.
    pub fn clear(&self) {
        self.entries().clear();
    }

    // Every write is a single insert or clear, so the map stays consistent
    // even if a holder of the lock panicked.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedRate>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: RateSource, C: Clock> RateSource for RateCache<S, C> {
    fn btc_price(&self, currency: &str) -> Result<f64, WalletError> {
        let now = self.clock.now_ms();
        let mut entries = self.entries();

        if let Some(cached) = entries.get(currency) {
            if now.saturating_sub(cached.fetched_at) < self.ttl_ms {
                return Ok(cached.price);
            }
        }

        let price = check_price(currency, self.source.btc_price(currency)?)?;
        log::debug!("refreshed {currency} rate: 1 BTC = {price}");
        entries.insert(
            currency.to_string(),
            CachedRate {
                price,
                fetched_at: now,
            },
        );
        Ok(price)
    }
}

fn check_price(currency: &str, price: f64) -> Result<f64, WalletError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(WalletError::RateUnavailable(format!(
            "nonsensical {currency} rate {price}"
        )))
    }
}

/// Convert a fiat amount to satoshis at the source's current price,
/// rounding to the nearest satoshi.
pub fn fiat_to_satoshi(
    amount: &str,
    currency: &str,
    rates: &dyn RateSource,
) -> Result<u64, WalletError> {
    let value: f64 = amount
        .trim()
        .parse()
        .map_err(|_| WalletError::InvalidAmount(amount.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(WalletError::InvalidAmount(amount.to_string()));
    }
    let price = check_price(currency, rates.btc_price(currency)?)?;
    let satoshis = (value / price * SATOSHIS_PER_BTC).round();
    if satoshis >= u64::MAX as f64 {
        return Err(WalletError::InvalidAmount(format!(
            "{amount} {currency} overflows a satoshi amount"
        )));
    }
    Ok(satoshis as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        fn advance(&self, ms: u64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Clone, Default)]
    struct CountingSource(Arc<AtomicUsize>);

    impl RateSource for CountingSource {
        fn btc_price(&self, _currency: &str) -> Result<f64, WalletError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(50_000.0 + n as f64)
        }
    }

    #[test]
    fn cached_until_ttl_expires() {
        let clock = ManualClock::default();
        let source = CountingSource::default();
        let calls = source.0.clone();
        let cache = RateCache::with_clock(source, clock.clone(), 1_000);

        assert_eq!(cache.btc_price("USD").unwrap(), 50_000.0);
        clock.advance(999);
        assert_eq!(cache.btc_price("USD").unwrap(), 50_000.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(1);
        assert_eq!(cache.btc_price("USD").unwrap(), 50_001.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn currencies_are_cached_separately() {
        let source = CountingSource::default();
        let calls = source.0.clone();
        let cache = RateCache::with_clock(source, ManualClock::default(), 1_000);
        cache.btc_price("USD").unwrap();
        cache.btc_price("EUR").unwrap();
        cache.btc_price("USD").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.clear();
        cache.btc_price("USD").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn poisoned_lock_still_clears_and_serves() {
        let source = CountingSource::default();
        let calls = source.0.clone();
        let cache = RateCache::with_clock(source, ManualClock::default(), 1_000);
        cache.btc_price("USD").unwrap();

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cache.entries.lock().unwrap();
            panic!("holder panicked");
        }));
        assert!(cache.entries.is_poisoned());

        assert_eq!(cache.btc_price("USD").unwrap(), 50_000.0);
        cache.clear();
        assert_eq!(cache.btc_price("USD").unwrap(), 50_001.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn source_errors_are_not_cached() {
        let cache = RateCache::with_clock(StaticRates::new(), ManualClock::default(), 1_000);
        assert!(matches!(
            cache.btc_price("USD"),
            Err(WalletError::RateUnavailable(_))
        ));
    }

    #[test]
    fn fiat_conversion() {
        let rates = StaticRates::new().with_rate("usd", 40_000.0);
        assert_eq!(fiat_to_satoshi("100", "USD", &rates).unwrap(), 250_000);
        assert_eq!(fiat_to_satoshi("0.01", "USD", &rates).unwrap(), 25);
        assert!(fiat_to_satoshi("-5", "USD", &rates).is_err());
        assert!(fiat_to_satoshi("ten", "USD", &rates).is_err());
        assert!(fiat_to_satoshi("1", "EUR", &rates).is_err());
    }

    #[test]
    fn zero_price_is_rejected() {
        let rates = StaticRates::new().with_rate("JPY", 0.0);
        assert!(matches!(
            fiat_to_satoshi("1", "JPY", &rates),
            Err(WalletError::RateUnavailable(_))
        ));
    }
}
