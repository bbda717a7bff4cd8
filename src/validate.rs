//! Input validation for the send form.
//!
//! Checks run in a fixed order and the first failure wins: amount, address,
//! fee rate presence, then fee rate range, then amount format. No address
//! format checks happen here; the engine rejects bad addresses at build time.

use crate::error::ValidationError;

pub const DEFAULT_MIN_FEE_RATE: u64 = 1;
pub const DEFAULT_MAX_FEE_RATE: u64 = 200;

/// Inclusive sat/vB range accepted from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRateBounds {
    pub min: u64,
    pub max: u64,
}

impl Default for FeeRateBounds {
    fn default() -> Self {
        Self { min: DEFAULT_MIN_FEE_RATE, max: DEFAULT_MAX_FEE_RATE }
    }
}

impl FeeRateBounds {
    pub fn contains(&self, rate: u64) -> bool {
        (self.min..=self.max).contains(&rate)
    }
}

/// Raw text as typed into the send form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentRequest {
    pub recipient_address: String,
    pub amount: String,
    pub fee_rate: String,
}

impl PaymentRequest {
    pub fn new(
        address: impl Into<String>,
        amount: impl Into<String>,
        fee_rate: impl Into<String>,
    ) -> Self {
        Self {
            recipient_address: address.into(),
            amount: amount.into(),
            fee_rate: fee_rate.into(),
        }
    }

    pub fn validate(
        &self,
        bounds: FeeRateBounds,
    ) -> Result<ValidatedPaymentRequest, ValidationError> {
        validate_with(&self.recipient_address, &self.amount, &self.fee_rate, bounds)
    }
}

/// A payment request that passed [`validate`]. Cannot be built any other way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPaymentRequest {
    recipient_address: String,
    amount_sats: u64,
    fee_rate_sat_per_vbyte: u64,
}

impl ValidatedPaymentRequest {
    pub fn recipient_address(&self) -> &str {
        &self.recipient_address
    }

    pub fn amount_sats(&self) -> u64 {
        self.amount_sats
    }

    pub fn fee_rate_sat_per_vbyte(&self) -> u64 {
        self.fee_rate_sat_per_vbyte
    }
}

/// Validate against the default `[1, 200]` fee rate range.
pub fn validate(
    address: &str,
    amount: &str,
    fee_rate: &str,
) -> Result<ValidatedPaymentRequest, ValidationError> {
    validate_with(address, amount, fee_rate, FeeRateBounds::default())
}

pub fn validate_with(
    address: &str,
    amount: &str,
    fee_rate: &str,
    bounds: FeeRateBounds,
) -> Result<ValidatedPaymentRequest, ValidationError> {
    let amount = amount.trim();
    let address = address.trim();
    let fee_rate = fee_rate.trim();

    if amount.is_empty() {
        return Err(ValidationError::MissingAmount);
    }
    if address.is_empty() {
        return Err(ValidationError::MissingAddress);
    }
    if fee_rate.is_empty() {
        return Err(ValidationError::MissingFeeRate);
    }

    let out_of_range = ValidationError::FeeRateOutOfRange { min: bounds.min, max: bounds.max };
    let fee_rate_sat_per_vbyte = match parse_digits(fee_rate) {
        Digits::Value(v) if bounds.contains(v) => v,
        Digits::Value(_) | Digits::Overflow => return Err(out_of_range),
        Digits::NotANumber => return Err(ValidationError::InvalidFeeRate),
    };

    let amount_sats = match parse_digits(amount) {
        Digits::Value(v) => v,
        Digits::Overflow | Digits::NotANumber => return Err(ValidationError::InvalidAmount),
    };

    Ok(ValidatedPaymentRequest {
        recipient_address: address.to_string(),
        amount_sats,
        fee_rate_sat_per_vbyte,
    })
}

enum Digits {
    Value(u64),
    Overflow,
    NotANumber,
}

// Only plain ASCII digits count; no sign, separators or decimals.
fn parse_digits(s: &str) -> Digits {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Digits::NotANumber;
    }
    match s.parse::<u64>() {
        Ok(v) => Digits::Value(v),
        Err(_) => Digits::Overflow,
    }
}
