//! The scale-search loop

use super::types::{FitAttempt, FitParams, FitRequest, FitResult};
use crate::error::{Error, Result};

/// Fit solver with tunable heuristics
#[derive(Debug, Clone, Copy, Default)]
pub struct FitSolver {
    params: FitParams,
}

/// Fit `request` using the default heuristics.
///
/// `measure` renders the document at the given scale and returns the total
/// content height. Errors it returns are propagated unchanged.
pub fn fit<F>(request: &FitRequest, measure: F) -> Result<FitResult>
where
    F: FnMut(f64) -> Result<f64>,
{
    FitSolver::default().fit(request, measure)
}

impl FitSolver {
    pub fn new(params: FitParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &FitParams {
        &self.params
    }

    /// Search for the largest scale, down to `min_scale`, at which the content
    /// fits the page budget.
    ///
    /// At most `1 + max_probes` calls are made to `measure`. Overflowing the
    /// budget after the last probe is reported as `fits == false`, not as an
    /// error.
    pub fn fit<F>(&self, request: &FitRequest, mut measure: F) -> Result<FitResult>
    where
        F: FnMut(f64) -> Result<f64>,
    {
        request.validate()?;

        let limit = request.limit();
        let min_scale = self.params.min_scale;

        let natural_height = checked_height(1.0, measure(1.0)?)?;
        if (natural_height - request.initial_height_px).abs() >= 1.0 {
            tracing::debug!(
                expected = request.initial_height_px,
                measured = natural_height,
                "natural height differs from request"
            );
        }

        let mut attempts: Vec<FitAttempt> = Vec::new();
        let mut current = FitAttempt {
            scale: 1.0,
            height_px: natural_height,
        };

        if natural_height > limit {
            for probe in 0..self.params.max_probes {
                let candidate = if probe == 0 {
                    (limit / natural_height).clamp(min_scale, 1.0)
                } else {
                    let refined =
                        current.scale * (limit / current.height_px) * self.params.damping;
                    let refined = refined.max(min_scale);
                    // Scale only ever shrinks.
                    if refined >= current.scale {
                        break;
                    }
                    refined
                };

                let height = checked_height(candidate, measure(candidate)?)?;
                current = FitAttempt {
                    scale: candidate,
                    height_px: height,
                };
                attempts.push(current);

                tracing::debug!(probe, scale = candidate, height, limit, "fit probe");

                if height <= limit || candidate <= min_scale {
                    break;
                }
            }
        }

        let result = FitResult {
            final_scale: current.scale,
            final_height_px: current.height_px,
            natural_height_px: natural_height,
            limit,
            estimated_pages: round2(current.height_px / request.per_page_capacity_px),
            fits: current.height_px <= limit,
            density_reduced: request.density_reduced,
            attempts,
        };

        if !result.fits {
            tracing::info!(
                final_scale = result.final_scale,
                estimated_pages = result.estimated_pages,
                max_pages = request.max_pages,
                "content still overflows page budget at best scale"
            );
        }

        Ok(result)
    }
}

fn checked_height(scale: f64, height: f64) -> Result<f64> {
    if height.is_finite() && height >= 0.0 {
        Ok(height)
    } else {
        Err(Error::render(format!(
            "renderer reported invalid height {} at scale {}",
            height, scale
        )))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
