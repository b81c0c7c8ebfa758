use std::fmt;

/// Outcome of advancing a [`Countdown`] by one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// Not running; nothing changed.
    Idle,
    Ticked { time_left: u64 },
    /// This tick reached zero. Reported once per run.
    Completed,
}

/// Logical second-granularity countdown.
///
/// It never reads a clock: whoever owns it calls [`Countdown::tick`] once per
/// elapsed second. Reaching zero stops the countdown; it stays stopped until
/// [`Countdown::reset`].
pub struct Countdown {
    initial: u64,
    time_left: u64,
    running: bool,
    completed: bool,
    on_complete: Option<Box<dyn FnMut() + Send>>,
}

impl Countdown {
    pub fn new(initial_secs: u64) -> Self {
        Self {
            initial: initial_secs,
            time_left: initial_secs,
            running: false,
            completed: false,
            on_complete: None,
        }
    }

    pub fn with_callback<F>(initial_secs: u64, on_complete: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let mut countdown = Self::new(initial_secs);
        countdown.on_complete = Some(Box::new(on_complete));
        countdown
    }

    /// Returns false when already running or finished.
    pub fn start(&mut self) -> bool {
        if self.running || self.completed {
            return false;
        }
        self.running = true;
        true
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.completed = false;
        self.time_left = self.initial;
    }

    pub fn tick(&mut self) -> CountdownTick {
        if !self.running {
            return CountdownTick::Idle;
        }

        if self.time_left <= 1 {
            self.time_left = 0;
            self.running = false;
            self.completed = true;
            if let Some(callback) = self.on_complete.as_mut() {
                callback();
            }
            return CountdownTick::Completed;
        }

        self.time_left -= 1;
        CountdownTick::Ticked {
            time_left: self.time_left,
        }
    }

    /// Pulls the remaining time to `secs` (capped at the initial value).
    /// Zero on a running countdown completes it on the next tick.
    pub fn set_time_left(&mut self, secs: u64) {
        if self.completed {
            return;
        }
        self.time_left = secs.min(self.initial);
    }

    pub fn time_left(&self) -> u64 {
        self.time_left
    }

    pub fn initial(&self) -> u64 {
        self.initial
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl fmt::Debug for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Countdown")
            .field("initial", &self.initial)
            .field("time_left", &self.time_left)
            .field("running", &self.running)
            .field("completed", &self.completed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    fn counting(initial: u64) -> (Countdown, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let countdown = Countdown::with_callback(initial, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (countdown, fired)
    }

    #[test]
    fn counts_down_and_completes_once() {
        let (mut countdown, fired) = counting(3);
        assert_eq!(countdown.tick(), CountdownTick::Idle);

        assert!(countdown.start());
        assert!(!countdown.start());
        assert_eq!(countdown.tick(), CountdownTick::Ticked { time_left: 2 });
        assert_eq!(countdown.tick(), CountdownTick::Ticked { time_left: 1 });
        assert_eq!(countdown.tick(), CountdownTick::Completed);

        assert_eq!(countdown.time_left(), 0);
        assert!(!countdown.is_running());
        assert!(countdown.is_completed());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert!(!countdown.start());
        assert_eq!(countdown.tick(), CountdownTick::Idle);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pause_freezes_time_left() {
        let mut countdown = Countdown::new(10);
        countdown.start();
        countdown.tick();
        countdown.pause();
        countdown.pause();

        assert_eq!(countdown.tick(), CountdownTick::Idle);
        assert_eq!(countdown.time_left(), 9);

        countdown.start();
        assert_eq!(countdown.tick(), CountdownTick::Ticked { time_left: 8 });
    }

    #[test]
    fn reset_restores_initial_without_restarting() {
        let (mut countdown, fired) = counting(2);
        countdown.start();
        countdown.tick();
        countdown.tick();
        assert!(countdown.is_completed());

        countdown.reset();
        assert_eq!(countdown.time_left(), 2);
        assert!(!countdown.is_running());
        assert!(!countdown.is_completed());

        countdown.start();
        countdown.tick();
        countdown.tick();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_initial_completes_on_first_tick() {
        let (mut countdown, fired) = counting(0);
        countdown.start();
        assert_eq!(countdown.tick(), CountdownTick::Completed);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_time_left_is_capped_at_initial() {
        let mut countdown = Countdown::new(60);
        countdown.set_time_left(600);
        assert_eq!(countdown.time_left(), 60);

        countdown.start();
        countdown.set_time_left(0);
        assert_eq!(countdown.tick(), CountdownTick::Completed);
    }
}
