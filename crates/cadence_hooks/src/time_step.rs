//! Hook cadences.
//!
//! A [`TimeStep`] answers two questions: "is this hook due at these tick
//! counters?" and "does this cadence fire at least as often as that one?". The
//! second question is a partial order used by the resolver to reject
//! dependencies that would leave a dependent without fresh input.

use core::fmt;

/// The unit a [`TimeStep`] counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeScale {
    /// Counts completed iterations (global, across epochs).
    #[default]
    Iteration,
    /// Counts completed epochs; only due on the tick that closes an epoch.
    Epoch,
}

impl TimeScale {
    fn unit(self, count: u64) -> &'static str {
        match (self, count) {
            (TimeScale::Iteration, 1) => "iteration",
            (TimeScale::Iteration, _) => "iterations",
            (TimeScale::Epoch, 1) => "epoch",
            (TimeScale::Epoch, _) => "epochs",
        }
    }
}

/// Training progress at one tick.
///
/// `iteration` is the global number of completed iterations (1 on the first
/// tick), `epoch` the number of completed epochs. `epoch_ended` is set only on
/// the tick that closes an epoch. The all-zero value is the setup tick, at
/// which nothing is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TickCounters {
    /// Completed epochs.
    pub epoch: u64,
    /// Completed iterations, counted globally.
    pub iteration: u64,
    /// Whether this tick closes an epoch.
    pub epoch_ended: bool,
}

impl TickCounters {
    /// Creates counters from their parts.
    #[must_use]
    pub fn new(epoch: u64, iteration: u64, epoch_ended: bool) -> Self {
        Self {
            epoch,
            iteration,
            epoch_ended,
        }
    }

    /// Counters for a mid-epoch tick at the given global iteration.
    #[must_use]
    pub fn at_iteration(iteration: u64) -> Self {
        Self::new(0, iteration, false)
    }

    /// Counters for the tick that closes `epoch` at the given global iteration.
    #[must_use]
    pub fn at_epoch_end(epoch: u64, iteration: u64) -> Self {
        Self::new(epoch, iteration, true)
    }

    /// Returns `true` for the setup tick.
    #[must_use]
    pub fn is_setup(&self) -> bool {
        self.iteration == 0 && self.epoch == 0
    }
}

impl fmt::Display for TickCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {} iteration {}", self.epoch, self.iteration)?;
        if self.epoch_ended {
            f.write_str(" (epoch end)")?;
        }
        Ok(())
    }
}

/// A hook cadence: every `interval` units of `scale`, optionally limited to a
/// number of firings.
///
/// # Example
///
/// ```
/// use cadence_hooks::{TickCounters, TimeStep};
///
/// let every_five = TimeStep::every_iterations(5);
/// assert!(every_five.is_due(&TickCounters::at_iteration(10)));
/// assert!(!every_five.is_due(&TickCounters::at_iteration(7)));
///
/// // An every-iteration hook can feed an every-five hook, not the reverse.
/// assert!(TimeStep::every_iteration().is_no_coarser_than(&every_five));
/// assert!(!every_five.is_no_coarser_than(&TimeStep::every_iteration()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeStep {
    scale: TimeScale,
    interval: u64,
    live_time: Option<u64>,
}

impl TimeStep {
    /// Creates a cadence of `interval` units of `scale`. Intervals below 1 are
    /// clamped to 1.
    #[must_use]
    pub fn new(scale: TimeScale, interval: u64) -> Self {
        Self {
            scale,
            interval: interval.max(1),
            live_time: None,
        }
    }

    /// Due on every iteration.
    #[must_use]
    pub fn every_iteration() -> Self {
        Self::new(TimeScale::Iteration, 1)
    }

    /// Due every `interval` iterations.
    #[must_use]
    pub fn every_iterations(interval: u64) -> Self {
        Self::new(TimeScale::Iteration, interval)
    }

    /// Due at the end of every epoch.
    #[must_use]
    pub fn every_epoch() -> Self {
        Self::new(TimeScale::Epoch, 1)
    }

    /// Due at the end of every `interval`-th epoch.
    #[must_use]
    pub fn every_epochs(interval: u64) -> Self {
        Self::new(TimeScale::Epoch, interval)
    }

    /// Limits the cadence to `lives` firings.
    #[must_use]
    pub fn with_live_time(mut self, lives: u64) -> Self {
        self.live_time = Some(lives);
        self
    }

    /// Removes any firing limit.
    #[must_use]
    pub fn unlimited(mut self) -> Self {
        self.live_time = None;
        self
    }

    /// The unit this cadence counts in.
    #[must_use]
    pub fn scale(&self) -> TimeScale {
        self.scale
    }

    /// Units between firings, always at least 1.
    #[must_use]
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Maximum number of firings; `None` means unlimited.
    #[must_use]
    pub fn live_time(&self) -> Option<u64> {
        self.live_time
    }

    /// Returns `true` if the cadence fires at `counters`.
    ///
    /// Live time is not considered here; the scheduler tracks remaining lives
    /// per resolved hook.
    #[must_use]
    pub fn is_due(&self, counters: &TickCounters) -> bool {
        match self.scale {
            TimeScale::Iteration => {
                counters.iteration > 0 && counters.iteration % self.interval == 0
            }
            TimeScale::Epoch => {
                counters.epoch_ended && counters.epoch > 0 && counters.epoch % self.interval == 0
            }
        }
    }

    /// Returns `true` if this cadence fires whenever `other` does, for at least
    /// as long as `other` keeps firing.
    ///
    /// This is the timing rule for dependencies: a required hook must be no
    /// coarser than its dependent.
    #[must_use]
    pub fn is_no_coarser_than(&self, other: &TimeStep) -> bool {
        let cadence_fits = match (self.scale, other.scale) {
            (TimeScale::Iteration, TimeScale::Iteration) | (TimeScale::Epoch, TimeScale::Epoch) => {
                other.interval % self.interval == 0
            }
            (TimeScale::Iteration, TimeScale::Epoch) => self.interval == 1,
            (TimeScale::Epoch, TimeScale::Iteration) => false,
        };
        if !cadence_fits {
            return false;
        }

        match (self.live_time, other.live_time) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(own), Some(theirs)) => {
                self.scale == other.scale
                    && self.interval.saturating_mul(own) >= other.interval.saturating_mul(theirs)
            }
        }
    }
}

impl Default for TimeStep {
    fn default() -> Self {
        Self::every_iteration()
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.interval == 1 {
            write!(f, "every {}", self.scale.unit(1))?;
        } else {
            write!(f, "every {} {}", self.interval, self.scale.unit(self.interval))?;
        }
        if let Some(lives) = self.live_time {
            write!(f, " ({lives} times)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_clamped() {
        assert_eq!(TimeStep::every_iterations(0).interval(), 1);
    }

    #[test]
    fn iteration_cadences_one_and_five() {
        let every = TimeStep::every_iteration();
        let every_five = TimeStep::every_iterations(5);

        let tick = TickCounters::at_iteration;
        assert!(every.is_due(&tick(10)) && every_five.is_due(&tick(10)));
        assert!(every.is_due(&tick(7)) && !every_five.is_due(&tick(7)));
        assert!(!every.is_due(&tick(0)) && !every_five.is_due(&tick(0)));
    }

    #[test]
    fn epoch_cadence_needs_epoch_end() {
        let every_two = TimeStep::every_epochs(2);

        assert!(!every_two.is_due(&TickCounters::new(2, 40, false)));
        assert!(every_two.is_due(&TickCounters::at_epoch_end(2, 40)));
        assert!(!every_two.is_due(&TickCounters::at_epoch_end(3, 60)));
        assert!(!every_two.is_due(&TickCounters::at_epoch_end(0, 0)));
    }

    #[test]
    fn same_scale_ordering_uses_divisibility() {
        let two = TimeStep::every_iterations(2);
        let four = TimeStep::every_iterations(4);
        let three = TimeStep::every_iterations(3);

        assert!(two.is_no_coarser_than(&four));
        assert!(!four.is_no_coarser_than(&two));
        assert!(!two.is_no_coarser_than(&three));
        assert!(two.is_no_coarser_than(&two));
    }

    #[test]
    fn cross_scale_ordering() {
        let epoch = TimeStep::every_epoch();

        assert!(TimeStep::every_iteration().is_no_coarser_than(&epoch));
        assert!(!TimeStep::every_iterations(2).is_no_coarser_than(&epoch));
        assert!(!epoch.is_no_coarser_than(&TimeStep::every_iteration()));
    }

    #[test]
    fn live_time_ordering() {
        let forever = TimeStep::every_iteration();
        let three = TimeStep::every_iteration().with_live_time(3);
        let five = TimeStep::every_iteration().with_live_time(5);

        assert!(forever.is_no_coarser_than(&three));
        assert!(!three.is_no_coarser_than(&forever));
        assert!(five.is_no_coarser_than(&three));
        assert!(!three.is_no_coarser_than(&five));

        // Every 2 for 3 lives covers iterations up to 6; every 6 once fires at 6.
        let short = TimeStep::every_iterations(2).with_live_time(3);
        let once = TimeStep::every_iterations(6).with_live_time(1);
        assert!(short.is_no_coarser_than(&once));

        let limited = TimeStep::every_iteration().with_live_time(100);
        assert!(!limited.is_no_coarser_than(&TimeStep::every_epoch().with_live_time(1)));
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(TimeStep::every_iteration().to_string(), "every iteration");
        assert_eq!(TimeStep::every_epochs(3).to_string(), "every 3 epochs");
        assert_eq!(
            TimeStep::every_iterations(5).with_live_time(2).to_string(),
            "every 5 iterations (2 times)"
        );
    }
}
