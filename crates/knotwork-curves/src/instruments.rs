//! Reference calibration probes.
//!
//! Small, self-contained [`CalibrationInstrument`] implementations that read
//! the curve directly. Real instrument models live with the caller; these
//! cover node observations, window averages and discounted cash flows.

use knotwork_math::guard::{ensure_finite, ensure_positive};
use serde::{Deserialize, Serialize};

use crate::error::{CurveError, CurveResult};
use crate::traits::{CalibrationInstrument, Curve};

/// Quotes the curve value at its maturity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointQuote {
    maturity: f64,
    quote: f64,
}

impl PointQuote {
    /// Creates a point quote.
    pub fn new(maturity: f64, quote: f64) -> CurveResult<Self> {
        Ok(Self {
            maturity: ensure_finite("maturity", maturity)?,
            quote: ensure_finite("quote", quote)?,
        })
    }
}

impl CalibrationInstrument for PointQuote {
    fn maturity(&self) -> f64 {
        self.maturity
    }

    fn target_quote(&self) -> f64 {
        self.quote
    }

    fn fair_value(&self, curve: &dyn Curve) -> CurveResult<f64> {
        curve.evaluate(self.maturity)
    }

    fn description(&self) -> String {
        format!("Point {}", self.maturity)
    }
}

/// Quotes the average of the curve over `[start, maturity]`.
///
/// On an instantaneous forward curve this is the period forward rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageQuote {
    start: f64,
    maturity: f64,
    quote: f64,
}

impl AverageQuote {
    /// Creates an average quote over a non-empty window.
    pub fn new(start: f64, maturity: f64, quote: f64) -> CurveResult<Self> {
        let start = ensure_finite("start", start)?;
        let maturity = ensure_finite("maturity", maturity)?;
        if maturity <= start {
            return Err(CurveError::invalid_input(format!(
                "averaging window [{start}, {maturity}] is empty"
            )));
        }
        Ok(Self {
            start,
            maturity,
            quote: ensure_finite("quote", quote)?,
        })
    }

    /// Window start.
    #[must_use]
    pub fn start(&self) -> f64 {
        self.start
    }
}

impl CalibrationInstrument for AverageQuote {
    fn maturity(&self) -> f64 {
        self.maturity
    }

    fn target_quote(&self) -> f64 {
        self.quote
    }

    fn fair_value(&self, curve: &dyn Curve) -> CurveResult<f64> {
        Ok(curve.integrate(self.start, self.maturity)? / (self.maturity - self.start))
    }

    fn description(&self) -> String {
        format!("Average {}-{}", self.start, self.maturity)
    }
}

/// Fixed cash flows discounted off a continuously compounded zero curve.
///
/// The quote is the price `Σ amount · exp(-z(t) · t)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowStrip {
    cashflows: Vec<(f64, f64)>,
    price: f64,
}

impl CashflowStrip {
    /// Creates a strip from `(time, amount)` pairs in increasing time order.
    pub fn new(cashflows: Vec<(f64, f64)>, price: f64) -> CurveResult<Self> {
        if cashflows.is_empty() {
            return Err(CurveError::invalid_input("cash flow strip has no cash flows"));
        }
        let mut previous = 0.0;
        for &(time, amount) in &cashflows {
            let time = ensure_positive("cash flow time", time)?;
            ensure_finite("cash flow amount", amount)?;
            if time <= previous {
                return Err(CurveError::invalid_input(format!(
                    "cash flow times must increase, {time} follows {previous}"
                )));
            }
            previous = time;
        }
        Ok(Self {
            cashflows,
            price: ensure_finite("price", price)?,
        })
    }

    /// Coupon bond paying `coupon` per year `frequency` times a year, plus 1
    /// at `maturity`.
    ///
    /// Coupon dates step back from `maturity`; a first period shorter than
    /// `1 / frequency` pays a coupon pro-rated to its length.
    pub fn bullet(maturity: f64, coupon: f64, frequency: u32, price: f64) -> CurveResult<Self> {
        let maturity = ensure_positive("maturity", maturity)?;
        let coupon = ensure_finite("coupon", coupon)?;
        if frequency == 0 {
            return Err(CurveError::invalid_input("coupon frequency must be positive"));
        }
        let step = 1.0 / f64::from(frequency);
        let cutoff = 1e-9 * maturity.max(1.0);

        let mut dates: Vec<f64> = (0u32..)
            .map(|k| maturity - f64::from(k) * step)
            .take_while(|&t| t > cutoff)
            .collect();
        dates.reverse();

        let mut start = 0.0;
        let mut cashflows = Vec::with_capacity(dates.len());
        for t in dates {
            cashflows.push((t, coupon * (t - start)));
            start = t;
        }
        if let Some(last) = cashflows.last_mut() {
            last.1 += 1.0;
        }
        Self::new(cashflows, price)
    }

    /// `(time, amount)` pairs.
    #[must_use]
    pub fn cashflows(&self) -> &[(f64, f64)] {
        &self.cashflows
    }
}

impl CalibrationInstrument for CashflowStrip {
    fn maturity(&self) -> f64 {
        self.cashflows.last().map_or(0.0, |&(t, _)| t)
    }

    fn target_quote(&self) -> f64 {
        self.price
    }

    fn fair_value(&self, curve: &dyn Curve) -> CurveResult<f64> {
        self.cashflows
            .iter()
            .map(|&(t, amount)| -> CurveResult<f64> {
                Ok(amount * (-curve.evaluate(t)? * t).exp())
            })
            .sum()
    }

    fn description(&self) -> String {
        format!("Strip {} x{}", self.maturity(), self.cashflows.len())
    }
}
