//! Progress reporting.
//!
//! A [`DataChunkIterator`](crate::data_chunk_iterator::DataChunkIterator) reports one unit of progress per yielded buffer to a [`ProgressReporter`].
//! Reporting is purely observational and has no effect on the data produced.

/// A progress reporter.
pub trait ProgressReporter {
    /// Called once before iteration begins with the total number of units.
    fn start(&mut self, total: u64);

    /// Report that `units` units of work have completed.
    fn advance(&mut self, units: u64);

    /// Called once when iteration ends, whether complete or not.
    fn finish(&mut self);
}

/// A progress reporter that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&mut self, _total: u64) {}

    fn advance(&mut self, _units: u64) {}

    fn finish(&mut self) {}
}

/// A progress reporter that counts units, useful for tests and for callers that poll progress.
#[derive(Debug, Default, Clone)]
pub struct CountingProgress {
    total: Option<u64>,
    position: u64,
    finished: bool,
}

impl CountingProgress {
    /// Create a new counting progress reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The total passed to [`ProgressReporter::start`], if started.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// The number of units completed.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns true if [`ProgressReporter::finish`] has been called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl ProgressReporter for CountingProgress {
    fn start(&mut self, total: u64) {
        self.total = Some(total);
    }

    fn advance(&mut self, units: u64) {
        self.position += units;
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl<T: ProgressReporter + ?Sized> ProgressReporter for std::rc::Rc<std::cell::RefCell<T>> {
    fn start(&mut self, total: u64) {
        self.borrow_mut().start(total);
    }

    fn advance(&mut self, units: u64) {
        self.borrow_mut().advance(units);
    }

    fn finish(&mut self) {
        self.borrow_mut().finish();
    }
}

#[cfg(feature = "progress")]
pub use bar::BarProgress;

#[cfg(feature = "progress")]
mod bar {
    use indicatif::{ProgressBar, ProgressStyle};

    use super::ProgressReporter;

    /// A terminal progress bar.
    #[derive(Debug)]
    pub struct BarProgress {
        description: String,
        bar: Option<ProgressBar>,
    }

    impl BarProgress {
        /// Create a new progress bar labelled with `description`.
        #[must_use]
        pub fn new(description: impl Into<String>) -> Self {
            Self {
                description: description.into(),
                bar: None,
            }
        }
    }

    impl ProgressReporter for BarProgress {
        fn start(&mut self, total: u64) {
            let style = ProgressStyle::with_template(
                "{msg} [{elapsed_precise}] [{bar}] ({pos}/{len}, ETA {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            let bar = ProgressBar::new(total);
            bar.set_style(style);
            bar.set_message(self.description.clone());
            bar.set_position(0);
            self.bar = Some(bar);
        }

        fn advance(&mut self, units: u64) {
            if let Some(bar) = &self.bar {
                bar.inc(units);
            }
        }

        fn finish(&mut self) {
            if let Some(bar) = self.bar.take() {
                bar.finish();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[test]
    fn counting_progress_shared() {
        let progress = Rc::new(RefCell::new(CountingProgress::new()));
        let mut reporter: Box<dyn ProgressReporter> = Box::new(progress.clone());
        reporter.start(3);
        reporter.advance(1);
        reporter.advance(2);
        reporter.finish();
        assert_eq!(progress.borrow().total(), Some(3));
        assert_eq!(progress.borrow().position(), 3);
        assert!(progress.borrow().is_finished());
    }

    #[cfg(feature = "progress")]
    #[test]
    fn bar_progress() {
        let mut bar = BarProgress::new("writing");
        bar.advance(1);
        bar.start(2);
        bar.advance(2);
        bar.finish();
        bar.finish();
    }
}
