#[cfg(test)]
#[path = "scale_test.rs"]
mod scale_test;

use serde::{Deserialize, Serialize};

/// A point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Continuous linear mapping from a data domain onto a pixel range.
///
/// Either end pair may be descending; value axes usually map a rising domain
/// onto a falling pixel range because screen `y` grows downward. Time axes use
/// epoch milliseconds as the domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearScale {
    pub domain: (f64, f64),
    pub range: (f64, f64),
}

impl LinearScale {
    #[must_use]
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    /// Map a domain value to pixels. A zero-width domain maps everything to
    /// the middle of the range.
    #[must_use]
    pub fn apply(&self, value: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        let span = d1 - d0;
        if span == 0.0 {
            return r0 + (r1 - r0) / 2.0;
        }
        r0 + (value - d0) / span * (r1 - r0)
    }

    /// Map a pixel position back to the domain. A zero-width range maps
    /// everything to the middle of the domain.
    #[must_use]
    pub fn invert(&self, pixel: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        let span = r1 - r0;
        if span == 0.0 {
            return d0 + (d1 - d0) / 2.0;
        }
        d0 + (pixel - r0) / span * (d1 - d0)
    }

    /// Lower end of the domain regardless of orientation.
    #[must_use]
    pub fn domain_min(&self) -> f64 {
        self.domain.0.min(self.domain.1)
    }

    /// Upper end of the domain regardless of orientation.
    #[must_use]
    pub fn domain_max(&self) -> f64 {
        self.domain.0.max(self.domain.1)
    }

    /// Same pixel range, new domain. Used when a view zooms.
    #[must_use]
    pub fn with_domain(self, domain: (f64, f64)) -> Self {
        Self { domain, ..self }
    }
}
