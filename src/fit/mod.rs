//! Fit-to-pages solver
//!
//! Computes the scale factor that brings rendered HTML content within a page
//! budget. The solver never talks to a browser directly: it is handed a
//! `measure(scale) -> height` callback and reduces the probes it makes into
//! an immutable [`FitResult`].

mod solver;
mod types;

pub use solver::{fit, FitSolver};
pub use types::{
    FitAttempt, FitParams, FitRequest, FitResult, DEFAULT_DAMPING, DEFAULT_MAX_PROBES,
    DEFAULT_MIN_SCALE,
};
