use std::fmt;
use std::str::FromStr;

use chain_btc::{OutputEntry, Transaction};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::rates::{fiat_to_satoshi, RateSource};

/// Unit an output amount is denominated in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    Satoshi,
    /// Micro-bitcoin (100 satoshis).
    Ubtc,
    /// Milli-bitcoin (100,000 satoshis).
    Mbtc,
    Btc,
    /// An ISO-4217 fiat code, converted through a [`RateSource`].
    Fiat(String),
}

impl Currency {
    /// Decimal places between this unit and satoshis; `None` for fiat.
    pub fn decimals(&self) -> Option<u32> {
        match self {
            Currency::Satoshi => Some(0),
            Currency::Ubtc => Some(2),
            Currency::Mbtc => Some(5),
            Currency::Btc => Some(8),
            Currency::Fiat(_) => None,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Currency::Satoshi => "satoshi",
            Currency::Ubtc => "ubtc",
            Currency::Mbtc => "mbtc",
            Currency::Btc => "btc",
            Currency::Fiat(code) => code,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "satoshi" | "sat" | "sats" => Ok(Currency::Satoshi),
            "ubtc" => Ok(Currency::Ubtc),
            "mbtc" => Ok(Currency::Mbtc),
            "btc" => Ok(Currency::Btc),
            code if code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()) => {
                Ok(Currency::Fiat(code.to_ascii_uppercase()))
            }
            _ => Err(WalletError::UnknownCurrency(s.to_string())),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = WalletError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.code().to_string()
    }
}

/// Parse a non-negative decimal string into an integer count of
/// `10^-decimals` units, without going through floating point.
///
/// Digits beyond `decimals` are accepted only when they are zero.
pub fn decimal_to_units(amount: &str, decimals: u32) -> Result<u64, WalletError> {
    let invalid = || WalletError::InvalidAmount(amount.to_string());
    let trimmed = amount.trim();
    let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let places = decimals as usize;
    let (kept, dropped) = frac.split_at(frac.len().min(places));
    if dropped.bytes().any(|b| b != b'0') {
        return Err(WalletError::InvalidAmount(format!(
            "{amount} has more than {decimals} decimal places"
        )));
    }

    let scale = 10u64.checked_pow(decimals).ok_or_else(invalid)?;
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u64>().map_err(|_| invalid())?
    };
    let frac_units = if kept.is_empty() {
        0
    } else {
        format!("{kept:0<places$}")
            .parse::<u64>()
            .map_err(|_| invalid())?
    };
    whole_units
        .checked_mul(scale)
        .and_then(|u| u.checked_add(frac_units))
        .ok_or_else(invalid)
}

/// Render `units` of `10^-decimals` as a trimmed decimal string.
pub fn units_to_decimal(units: u64, decimals: u32) -> String {
    if decimals == 0 {
        return units.to_string();
    }
    let scale = 10u64.pow(decimals);
    let frac = format!("{:0width$}", units % scale, width = decimals as usize);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        (units / scale).to_string()
    } else {
        format!("{}.{frac}", units / scale)
    }
}

/// A payment request before conversion to satoshis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub destination: String,
    /// Decimal amount in `currency`.
    pub amount: String,
    pub currency: Currency,
}

impl OutputSpec {
    pub fn new(destination: impl Into<String>, amount: impl Into<String>, currency: Currency) -> Self {
        Self {
            destination: destination.into(),
            amount: amount.into(),
            currency,
        }
    }

    pub fn satoshis(destination: impl Into<String>, amount: u64) -> Self {
        Self::new(destination, amount.to_string(), Currency::Satoshi)
    }

    /// The amount in satoshis. `rates` is consulted only for fiat amounts.
    pub fn to_satoshi(&self, rates: Option<&dyn RateSource>) -> Result<u64, WalletError> {
        match &self.currency {
            Currency::Fiat(code) => {
                let rates = rates.ok_or_else(|| {
                    WalletError::RateUnavailable(format!("no rate source for {code}"))
                })?;
                fiat_to_satoshi(&self.amount, code, rates)
            }
            unit => decimal_to_units(&self.amount, unit.decimals().unwrap_or_default()),
        }
    }

    pub fn to_entry(&self, rates: Option<&dyn RateSource>) -> Result<OutputEntry, WalletError> {
        Ok(OutputEntry(self.destination.clone(), self.to_satoshi(rates)?))
    }
}

/// A broadcast-ready transaction and its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub hex: String,
    pub txid: String,
}

impl From<&Transaction> for SignedTransaction {
    fn from(tx: &Transaction) -> Self {
        Self {
            hex: tx.to_hex(),
            txid: tx.txid(),
        }
    }
}
