//! # Money Module
//!
//! Integer money, tax rates and the tax breakdown frozen into a queued sale.
//!
//! ## Why Freeze the Breakdown?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OFFLINE RENDERING                                                      │
//! │                                                                         │
//! │  enqueue(create-sale) ──► TaxBreakdown::from_gross(price, rate, exempt) │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │                     stored inside the sale payload                      │
//! │                                   │                                     │
//! │          ┌────────────────────────┴───────────────────────┐            │
//! │          ▼                                                ▼            │
//! │   queue list / receipt preview                  authoritative store    │
//! │   (no network needed)                           (same numbers sent)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All amounts are `i64` cents. The only division happens in
//! [`TaxBreakdown::from_gross`], which rounds half up and assigns the
//! rounding cent to the tax line so `taxable_base + tax_amount == gross`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use shopline_core::money::Money;
    ///
    /// let price = Money::from_cents(50_000);
    /// assert_eq!(price.cents(), 50_000);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Tax on a tax-exclusive amount: `(cents * bps + 5000) / 10000`.
    ///
    /// ## Example
    /// ```rust
    /// use shopline_core::money::{Money, TaxRate};
    ///
    /// let tax = Money::from_cents(1000).calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        // i128 keeps large amounts from overflowing
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }
}

/// Currency-agnostic rendering (`"500.00"`, `"-5.50"`). The presentation
/// layer adds the currency symbol.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (825 = 8.25%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Percentage for display only.
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

// =============================================================================
// Tax Breakdown
// =============================================================================

/// Tax split of a tax-inclusive sale price, computed once at enqueue time.
///
/// ## Invariant
/// `taxable_base + tax_amount` equals the gross price that produced it, and
/// an exempt breakdown always carries a zero tax amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TaxBreakdown {
    /// Rate applied (zero when exempt).
    pub rate: TaxRate,
    /// Tax portion of the gross price.
    pub tax_amount: Money,
    /// Pre-tax base.
    pub taxable_base: Money,
    /// Customer is tax exempt.
    pub exempt: bool,
}

impl TaxBreakdown {
    /// Splits a tax-inclusive `gross` amount into base and tax.
    ///
    /// ```text
    /// base = round(gross * 10000 / (10000 + bps))
    /// tax  = gross - base
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use shopline_core::money::{Money, TaxBreakdown, TaxRate};
    ///
    /// let tax = TaxBreakdown::from_gross(Money::from_cents(11_000), TaxRate::from_bps(1000), false);
    /// assert_eq!(tax.taxable_base.cents(), 10_000);
    /// assert_eq!(tax.tax_amount.cents(), 1_000);
    /// ```
    pub fn from_gross(gross: Money, rate: TaxRate, exempt: bool) -> Self {
        if exempt || rate.is_zero() {
            return Self::untaxed(gross, exempt);
        }

        let divisor = 10_000i128 + rate.bps() as i128;
        let numerator = gross.cents() as i128 * 10_000;
        // Round half away from zero
        let base = if numerator >= 0 {
            (numerator + divisor / 2) / divisor
        } else {
            (numerator - divisor / 2) / divisor
        };
        let taxable_base = Money::from_cents(base as i64);

        TaxBreakdown {
            rate,
            tax_amount: gross - taxable_base,
            taxable_base,
            exempt: false,
        }
    }

    /// Breakdown with no tax at all.
    pub fn untaxed(gross: Money, exempt: bool) -> Self {
        TaxBreakdown {
            rate: TaxRate::zero(),
            tax_amount: Money::zero(),
            taxable_base: gross,
            exempt,
        }
    }

    /// Gross amount this breakdown was computed from.
    pub fn gross(&self) -> Money {
        self.taxable_base + self.tax_amount
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_currency_agnostic() {
        assert_eq!(Money::from_cents(50_000).to_string(), "500.00");
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_tax_calculation_with_rounding() {
        let tax = Money::from_cents(1000).calculate_tax(TaxRate::from_bps(825));
        assert_eq!(tax.cents(), 83);
    }

    #[test]
    fn test_breakdown_splits_inclusive_price() {
        let tax = TaxBreakdown::from_gross(Money::from_cents(11_000), TaxRate::from_bps(1000), false);
        assert_eq!(tax.taxable_base.cents(), 10_000);
        assert_eq!(tax.tax_amount.cents(), 1_000);
        assert!(!tax.exempt);
    }

    #[test]
    fn test_breakdown_rounding_cent_goes_to_tax() {
        // 500.00 at 8.25% inclusive: base = 50000 * 10000 / 10825 = 46189.37 → 46189
        let gross = Money::from_cents(50_000);
        let tax = TaxBreakdown::from_gross(gross, TaxRate::from_bps(825), false);
        assert_eq!(tax.taxable_base.cents(), 46_189);
        assert_eq!(tax.tax_amount.cents(), 3_811);
        assert_eq!(tax.gross(), gross);
    }

    #[test]
    fn test_exempt_breakdown_has_no_tax() {
        let gross = Money::from_cents(50_000);
        let tax = TaxBreakdown::from_gross(gross, TaxRate::from_bps(825), true);
        assert!(tax.exempt);
        assert!(tax.tax_amount.is_zero());
        assert!(tax.rate.is_zero());
        assert_eq!(tax.taxable_base, gross);
    }

    #[test]
    fn test_breakdown_serializes_camel_case() {
        let tax = TaxBreakdown::from_gross(Money::from_cents(11_000), TaxRate::from_bps(1000), false);
        let json = serde_json::to_value(tax).unwrap();
        assert_eq!(json["taxAmount"], 1_000);
        assert_eq!(json["taxableBase"], 10_000);
        assert_eq!(json["rate"], 1000);
    }
}
