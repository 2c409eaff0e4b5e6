//! Calibration inputs: the instrument set and the run context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use knotwork_math::guard::ensure_finite;

use crate::error::{CurveError, CurveResult};
use crate::traits::CalibrationInstrument;

/// Instruments in increasing maturity order, each with the quote to match.
///
/// Quotes start out as the instruments' own target quotes and can be
/// replaced wholesale (for scenario runs) without touching the instruments.
#[derive(Debug, Clone)]
pub struct CalibrationSet {
    instruments: Vec<Arc<dyn CalibrationInstrument>>,
    quotes: Vec<f64>,
}

impl CalibrationSet {
    /// Creates a set quoting each instrument at its target quote.
    ///
    /// # Errors
    ///
    /// - [`CurveError::InvalidInput`] for an empty set or non-finite values
    /// - [`CurveError::InstrumentOrderingViolation`] unless maturities are
    ///   strictly increasing
    pub fn new(instruments: Vec<Arc<dyn CalibrationInstrument>>) -> CurveResult<Self> {
        let quotes = instruments.iter().map(|i| i.target_quote()).collect();
        Self::with_quotes(instruments, quotes)
    }

    /// Creates a set with explicit quotes.
    pub fn with_quotes(
        instruments: Vec<Arc<dyn CalibrationInstrument>>,
        quotes: Vec<f64>,
    ) -> CurveResult<Self> {
        if instruments.is_empty() {
            return Err(CurveError::invalid_input("calibration set is empty"));
        }
        if quotes.len() != instruments.len() {
            return Err(CurveError::invalid_input(format!(
                "{} instruments but {} quotes",
                instruments.len(),
                quotes.len()
            )));
        }

        let mut previous: Option<f64> = None;
        for (index, (instrument, &quote)) in instruments.iter().zip(&quotes).enumerate() {
            let maturity = ensure_finite("instrument maturity", instrument.maturity())?;
            ensure_finite("instrument quote", quote)?;
            if let Some(previous) = previous {
                if maturity <= previous {
                    return Err(CurveError::InstrumentOrderingViolation {
                        index,
                        maturity,
                        previous,
                    });
                }
            }
            previous = Some(maturity);
        }

        Ok(Self {
            instruments,
            quotes,
        })
    }

    /// Same instruments, new quotes.
    pub fn requoted(&self, quotes: Vec<f64>) -> CurveResult<Self> {
        Self::with_quotes(self.instruments.clone(), quotes)
    }

    /// Number of instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Always false; empty sets are rejected at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Instruments in maturity order.
    #[must_use]
    pub fn instruments(&self) -> &[Arc<dyn CalibrationInstrument>] {
        &self.instruments
    }

    /// Quotes, one per instrument.
    #[must_use]
    pub fn quotes(&self) -> &[f64] {
        &self.quotes
    }

    /// Maturities, one per instrument.
    #[must_use]
    pub fn maturities(&self) -> Vec<f64> {
        self.instruments.iter().map(|i| i.maturity()).collect()
    }
}

/// Cooperative cancellation for a calibration run.
///
/// Both the flag and the deadline are checked before every instrument step.
#[derive(Debug, Clone, Default)]
pub struct CalibrationContext {
    cancel: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl CalibrationContext {
    /// A context that never cancels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels once `flag` is set.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Cancels at `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancels `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// True once the flag is set or the deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
