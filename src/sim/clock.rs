/// A simulation clock that walks fixed-size time steps over a window.
///
/// The `Clock` yields the timestamp of each step, in seconds, until the end
/// of the window is reached.
///
/// # Examples
///
/// ```
/// use prosumer_market::sim::clock::Clock;
///
/// let mut clock = Clock::new(0, 3, 1);
/// let mut stamps = Vec::new();
///
/// clock.run(|t| stamps.push(t));
/// assert_eq!(stamps, vec![0, 1, 2]);
/// ```
pub struct Clock {
    /// Timestamp returned by the next tick
    current: u64,
    /// Exclusive end of the window
    end: u64,
    /// Step size in seconds
    step: u64,
}

impl Clock {
    /// Creates a clock over `[start, end)` advancing by `step` seconds.
    ///
    /// A zero step is raised to one second.
    pub fn new(start: u64, end: u64, step: u64) -> Self {
        Self {
            current: start,
            end,
            step: step.max(1),
        }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(timestamp)` - The timestamp of this step
    /// * `None` - If the window is exhausted
    pub fn tick(&mut self) -> Option<u64> {
        if self.current < self.end {
            let t = self.current;
            self.current = self.current.saturating_add(self.step);
            Some(t)
        } else {
            None
        }
    }

    /// Runs a function for each remaining step in the clock.
    pub fn run(&mut self, mut f: impl FnMut(u64)) {
        while let Some(t) = self.tick() {
            f(t);
        }
    }
}
