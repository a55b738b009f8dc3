//! Data shapes exchanged with the fit solver

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Content is never shrunk below this fraction of its natural size
pub const DEFAULT_MIN_SCALE: f64 = 0.25;

/// Undershoot applied to the refinement estimate so convergence comes from above
pub const DEFAULT_DAMPING: f64 = 0.98;

/// Scaled probes allowed after the natural-height measurement
pub const DEFAULT_MAX_PROBES: u32 = 2;

/// Input to one fit attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FitRequest {
    /// Natural (unscaled) content height in CSS pixels
    pub initial_height_px: f64,
    /// Usable printable height of one page in CSS pixels
    pub per_page_capacity_px: f64,
    /// Page budget
    pub max_pages: u32,
    /// Whether density reduction was applied before measuring
    #[serde(default)]
    pub density_reduced: bool,
}

impl FitRequest {
    pub fn new(initial_height_px: f64, per_page_capacity_px: f64, max_pages: u32) -> Self {
        Self {
            initial_height_px,
            per_page_capacity_px,
            max_pages,
            density_reduced: false,
        }
    }

    pub fn with_density_reduced(mut self, density_reduced: bool) -> Self {
        self.density_reduced = density_reduced;
        self
    }

    /// Total content height the page budget can hold
    pub fn limit(&self) -> f64 {
        self.per_page_capacity_px * f64::from(self.max_pages)
    }

    /// Reject degenerate requests before any rendering work is done
    pub fn validate(&self) -> Result<()> {
        if !self.initial_height_px.is_finite() || self.initial_height_px <= 0.0 {
            return Err(Error::invalid_input(format!(
                "initial_height_px must be a positive number, got {}",
                self.initial_height_px
            )));
        }
        if !self.per_page_capacity_px.is_finite() || self.per_page_capacity_px <= 0.0 {
            return Err(Error::invalid_input(format!(
                "per_page_capacity_px must be a positive number, got {}",
                self.per_page_capacity_px
            )));
        }
        if self.max_pages == 0 {
            return Err(Error::invalid_input("max_pages must be at least 1"));
        }
        Ok(())
    }
}

/// One probe-and-measure cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FitAttempt {
    /// Scale factor applied for this probe, in (0, 1]
    pub scale: f64,
    /// Content height reported by the renderer at that scale
    pub height_px: f64,
}

/// Outcome of fitting a document to its page budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FitResult {
    /// Scale the document should be printed at
    pub final_scale: f64,
    /// Content height at `final_scale`
    pub final_height_px: f64,
    /// Height measured at scale 1 before any probing
    pub natural_height_px: f64,
    /// `per_page_capacity_px * max_pages`
    pub limit: f64,
    /// `final_height_px / per_page_capacity_px`, rounded to 2 decimals
    pub estimated_pages: f64,
    /// Whether `final_height_px <= limit`
    pub fits: bool,
    /// Whether density reduction preceded the measurement
    pub density_reduced: bool,
    /// Scaled probes in the order they were made
    pub attempts: Vec<FitAttempt>,
}

impl FitResult {
    /// Number of scaled probes, excluding the natural-height measurement
    pub fn probes(&self) -> usize {
        self.attempts.len()
    }

    /// Whether any scaling was applied
    pub fn scaled(&self) -> bool {
        self.final_scale < 1.0
    }
}

/// Tunable heuristics of the solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParams {
    /// Readability floor for the scale factor
    pub min_scale: f64,
    /// Multiplier applied to the refinement estimate
    pub damping: f64,
    /// Scaled probes after the natural-height measurement
    pub max_probes: u32,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            min_scale: DEFAULT_MIN_SCALE,
            damping: DEFAULT_DAMPING,
            max_probes: DEFAULT_MAX_PROBES,
        }
    }
}

impl FitParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_scale > 0.0 && self.min_scale <= 1.0) {
            return Err(Error::invalid_input(format!(
                "min_scale must be in (0, 1], got {}",
                self.min_scale
            )));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(Error::invalid_input(format!(
                "damping must be in (0, 1], got {}",
                self.damping
            )));
        }
        Ok(())
    }
}
