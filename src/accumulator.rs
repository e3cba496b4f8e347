//! Lifetime totals accumulated from deduplicated samples.

use tracing::debug;

use crate::sample::{ClassCounts, Sample};

/// Monotonic per-class counters; reset only by a process restart.
pub type LifetimeTotals = ClassCounts;

#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    totals:   LifetimeTotals,
    accepted: u64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample's per-class counts to the totals.
    ///
    /// Callers must have run the sample through the dedup guard first; the
    /// accumulator itself has no notion of identity.
    pub fn accept(&mut self, sample: &Sample) {
        self.totals.add(sample.counts());
        self.accepted += 1;
        debug!(
            source = sample.source_id(),
            accepted = self.accepted,
            total = self.totals.sum(),
            "Accumulated sample"
        );
    }

    pub fn totals(&self) -> &LifetimeTotals {
        &self.totals
    }

    /// Number of samples accepted since start.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{SampleTime, VehicleClass};

    #[test]
    fn test_accept_adds_every_class() {
        let mut acc = Accumulator::new();
        let counts = ClassCounts { car: 2, bike: 1, truck: 0, bus: 3, auto: 5 };
        let s = Sample::new(SampleTime::parse("2024-05-01T12:00:00"), "cam", counts, 11);
        acc.accept(&s);
        acc.accept(&s);
        assert_eq!(acc.totals().get(VehicleClass::Auto), 10);
        assert_eq!(acc.totals().get(VehicleClass::Truck), 0);
        assert_eq!(acc.accepted(), 2);
    }

    #[test]
    fn test_totals_saturate() {
        let mut acc = Accumulator::new();
        let counts = ClassCounts { car: u64::MAX, ..Default::default() };
        let s = Sample::new(SampleTime::parse("2024-05-01T12:00:00"), "cam", counts, 0);
        acc.accept(&s);
        acc.accept(&s);
        assert_eq!(acc.totals().car, u64::MAX);
    }
}
