//! Consecutive passes iterator
use hifitime::{Duration, Epoch, Unit};
use log::debug;

use crate::{
    cfg::PredictionConfig,
    elements::OrbitalElements,
    error::Error,
    location::ObserverLocation,
    observation::Propagator,
    transit::{Transit, DEFAULT_MAX_ITERATIONS},
};

/// Default time cursor advance past each pass end [s]
pub const DEFAULT_GUARD_S: f64 = 60.0;

/// Iterates upcoming [Transit]s in chronological order.
/// The finder is fused: it stops after the first error it yields.
pub struct TransitFinder<'a, P: ?Sized> {
    source: &'a P,
    elements: &'a OrbitalElements,
    location: ObserverLocation,
    cursor: Epoch,
    ending_after: Epoch,
    ending_before: Option<Epoch>,
    guard: Duration,
    max_iterations: usize,
    done: bool,
}

/// Returns a [TransitFinder] that yields every pass ending after `ending_after`.
pub fn transits<'a, P: Propagator + ?Sized>(
    source: &'a P,
    elements: &'a OrbitalElements,
    location: ObserverLocation,
    ending_after: Epoch,
) -> TransitFinder<'a, P> {
    TransitFinder {
        source,
        elements,
        location,
        cursor: ending_after,
        ending_after,
        ending_before: None,
        guard: DEFAULT_GUARD_S * Unit::Second,
        max_iterations: DEFAULT_MAX_ITERATIONS,
        done: false,
    }
}

impl<'a, P: Propagator + ?Sized> TransitFinder<'a, P> {
    /// Stops the iteration at the first pass ending after `t`
    pub fn ending_before(mut self, t: Epoch) -> Self {
        self.ending_before = Some(t);
        self
    }
    /// Customizes the cursor advance, applied past each pass
    pub fn with_guard(mut self, guard: Duration) -> Self {
        self.guard = guard;
        self
    }
    /// Applies the prediction preferences
    pub fn with_config(mut self, cfg: &PredictionConfig) -> Self {
        self.guard = cfg.guard();
        self.max_iterations = cfg.max_peak_iterations;
        self
    }
}

impl<'a, P: Propagator + ?Sized> Iterator for TransitFinder<'a, P> {
    type Item = Result<Transit<'a, P>, Error>;
    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let window = match self
                .source
                .predict_window(self.elements, &self.location, self.cursor)
            {
                Ok(window) => window,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                },
            };
            let (start, end) = match (window.first(), window.last()) {
                (Some(first), Some(last)) => (first.epoch, last.epoch),
                _ => {
                    self.done = true;
                    return Some(Err(Error::Predict(format!(
                        "{}: empty prediction window @{}",
                        self.elements.name(),
                        self.cursor
                    ))));
                },
            };

            if let Some(before) = self.ending_before {
                if end > before {
                    debug!("{} - pass ending {} past {}", self.elements.name(), end, before);
                    self.done = true;
                    return None;
                }
            }

            if end > self.cursor {
                self.cursor = end;
            }
            self.cursor += self.guard;

            if end > self.ending_after {
                let transit = Transit::new(self.source, self.elements, self.location, start, end)
                    .with_max_iterations(self.max_iterations);
                return Some(Ok(transit));
            }
        }
        None
    }
}

impl<P: Propagator + ?Sized> std::iter::FusedIterator for TransitFinder<'_, P> {}
