//! Satellite passes over the ground station
use hifitime::{Duration, Epoch, Unit};
use log::{debug, trace};

use crate::{
    elements::OrbitalElements,
    error::{Error, RangeError},
    location::ObserverLocation,
    observation::{Observation, Propagator},
};

pub mod finder;
pub mod report;

/// Default peak and prune resolution [s]
pub const DEFAULT_EPSILON_S: f64 = 0.1;
/// Default peak search budget, in (left, mid, right) evaluations
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// One pass (rise to set) of a satellite over a ground station.
pub struct Transit<'a, P: ?Sized> {
    source: &'a P,
    elements: &'a OrbitalElements,
    location: ObserverLocation,
    /// Rise instant
    pub start: Epoch,
    /// Set instant
    pub end: Epoch,
    max_iterations: usize,
}

impl<P: ?Sized> Clone for Transit<'_, P> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            elements: self.elements,
            location: self.location,
            start: self.start,
            end: self.end,
            max_iterations: self.max_iterations,
        }
    }
}

impl<P: ?Sized> std::fmt::Debug for Transit<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Transit")
            .field("satellite", &self.elements.name())
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

impl<'a, P: Propagator + ?Sized> Transit<'a, P> {
    /// Builds a new [Transit] over [start, end].
    pub fn new(
        source: &'a P,
        elements: &'a OrbitalElements,
        location: ObserverLocation,
        start: Epoch,
        end: Epoch,
    ) -> Self {
        debug_assert!(start <= end, "transit ends before it starts");
        Self {
            source,
            elements,
            location,
            start,
            end,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
    /// Overrides the peak search budget
    pub fn with_max_iterations(&self, max_iterations: usize) -> Self {
        let mut s = self.clone();
        s.max_iterations = max_iterations;
        s
    }
    /// Satellite this pass belongs to
    pub fn elements(&self) -> &OrbitalElements {
        self.elements
    }
    /// Ground station
    pub fn location(&self) -> &ObserverLocation {
        &self.location
    }
    /// Pass duration
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
    /// Look angles at `t`, which must lie within the transit.
    pub fn at(&self, t: Epoch) -> Result<Observation, Error> {
        if t < self.start || t > self.end {
            return Err(RangeError::OutsideTransit {
                t,
                start: self.start,
                end: self.end,
            }
            .into());
        }
        self.source.observe(self.elements, &self.location, t)
    }
    fn elevation(&self, t: Epoch) -> Result<f64, Error> {
        Ok(self
            .source
            .observe(self.elements, &self.location, t)?
            .elevation_deg)
    }
    /// Returns the culmination point, with [DEFAULT_EPSILON_S] resolution.
    pub fn peak(&self) -> Result<Observation, Error> {
        self.peak_with(DEFAULT_EPSILON_S * Unit::Second)
    }
    /// Returns the culmination point, searched by coarse to fine hill climbing
    /// down to `epsilon` resolution.
    ///
    /// Elevation must be unimodal over [start, end] (rises then sets).
    /// On a multimodal pass this converges to one of the local maxima.
    pub fn peak_with(&self, epsilon: Duration) -> Result<Observation, Error> {
        let epsilon = epsilon.to_seconds();
        let width = self.duration().to_seconds();
        let at = |offset: f64| self.start + offset * Unit::Second;

        let mut ts = width / 2.0;
        let mut step = width;
        let mut iterations = 0;

        while step > epsilon {
            step /= 4.0;
            // climb the gradient at this step size
            let mut direction = None;
            loop {
                iterations += 1;
                if iterations > self.max_iterations {
                    return Err(Error::Convergence {
                        iterations: self.max_iterations,
                    });
                }
                let mid = self.elevation(at(ts))?;
                let left = self.elevation(at(ts - step))?;
                let right = self.elevation(at(ts + step))?;
                if left <= mid && mid >= right {
                    break;
                }
                let slope = if left > right { -1.0 } else { 1.0 };
                if *direction.get_or_insert(slope) != slope {
                    // stepped over the peak
                    break;
                }
                let next = ts + slope * step;
                if next < 0.0 || next > width {
                    break;
                }
                ts = next;
            }
        }
        let peak = if ts >= width { self.end } else { at(ts) };
        trace!(
            "{} - peak @{} after {} iterations",
            self.elements.name(),
            peak,
            iterations
        );
        self.at(peak)
    }
    /// Returns the maximal sub transit, around the peak, over which
    /// `predicate` holds. `predicate` must either be false everywhere or true
    /// over a contiguous period that includes the peak. When it does not hold
    /// at the peak, the returned transit is the peak instant.
    pub fn prune<F>(&self, predicate: F) -> Result<Self, Error>
    where
        F: FnMut(Epoch) -> Result<bool, Error>,
    {
        self.prune_with(predicate, DEFAULT_EPSILON_S * Unit::Second)
    }
    /// [Self::prune] with custom bisection resolution.
    pub fn prune_with<F>(&self, mut predicate: F, epsilon: Duration) -> Result<Self, Error>
    where
        F: FnMut(Epoch) -> Result<bool, Error>,
    {
        let peak = self.peak()?.epoch;
        let midpoint = |left: Epoch, right: Epoch| {
            left + (right - left).to_seconds() * 0.5 * Unit::Second
        };

        let (start, end) = if !predicate(peak)? {
            (peak, peak)
        } else {
            let start = if predicate(self.start)? {
                self.start
            } else {
                // predicate(right) holds
                let (mut left, mut right) = (self.start, peak);
                while right - left > epsilon {
                    let mid = midpoint(left, right);
                    if mid == left || mid == right {
                        // resolution floor
                        break;
                    }
                    if predicate(mid)? {
                        right = mid;
                    } else {
                        left = mid;
                    }
                }
                right
            };
            let end = if predicate(self.end)? {
                self.end
            } else {
                // predicate(left) holds
                let (mut left, mut right) = (peak, self.end);
                while right - left > epsilon {
                    let mid = midpoint(left, right);
                    if mid == left || mid == right {
                        // resolution floor
                        break;
                    }
                    if predicate(mid)? {
                        left = mid;
                    } else {
                        right = mid;
                    }
                }
                left
            };
            (start, end)
        };

        debug!(
            "{} - pruned [{}, {}] to [{}, {}]",
            self.elements.name(),
            self.start,
            self.end,
            start,
            end
        );

        let mut pruned = self.clone();
        pruned.start = start;
        pruned.end = end;
        Ok(pruned)
    }
    /// Returns the portion of the pass above given elevation [deg].
    pub fn above(&self, elevation_deg: f64) -> Result<Self, Error> {
        self.prune(|t| Ok(self.at(t)?.elevation_deg >= elevation_deg))
    }
}
