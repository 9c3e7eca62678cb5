use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Width of the rendered progress bar in characters.
pub const BAR_WIDTH: usize = 100;

/// Bar glyphs by eighths of a cell, empty to full.
const BLOCKS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];

/// Progress of one maintenance pass, sampled at `status_time`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMetrics {
    pub start_time: Option<DateTime<Utc>>,
    pub status_time: Option<DateTime<Utc>>,
    /// Files and folders found by the counting walk.
    pub number_to_process: u64,
    /// Files and folders handled so far.
    pub number_processed: u64,
}

impl ProgressMetrics {
    pub fn new(
        start_time: DateTime<Utc>,
        status_time: DateTime<Utc>,
        number_to_process: u64,
        number_processed: u64,
    ) -> Self {
        Self {
            start_time: Some(start_time),
            status_time: Some(status_time),
            number_to_process,
            number_processed,
        }
    }

    /// Metrics with every field zeroed/absent.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Option<TimeDelta> {
        Some(self.status_time? - self.start_time?)
    }

    /// Fraction done in `[0, 1]`-ish; `0.0` if nothing is known to process.
    pub fn progress(&self) -> f64 {
        if self.number_to_process == 0 {
            return 0.0;
        }
        self.number_processed as f64 / self.number_to_process as f64
    }

    /// Fraction completed per second.
    pub fn progress_rate(&self) -> f64 {
        let Some(elapsed) = self.elapsed() else {
            return 0.0;
        };
        let millis = elapsed.num_milliseconds();
        if millis <= 0 {
            return 0.0;
        }
        self.progress() / millis as f64 * 1000.0
    }

    /// Projected total duration of the pass.
    pub fn estimated_duration(&self) -> Option<TimeDelta> {
        let elapsed = self.elapsed()?;
        let progress = self.progress();
        if progress <= 0.0 {
            return None;
        }
        let total_ms = elapsed.num_milliseconds() as f64 / progress;
        Some(TimeDelta::milliseconds(total_ms as i64))
    }

    pub fn estimated_completion_time(&self) -> Option<DateTime<Utc>> {
        Some(self.start_time? + self.estimated_duration()?)
    }

    pub fn remaining(&self) -> Option<TimeDelta> {
        Some(self.estimated_duration()? - self.elapsed()?)
    }

    /// Fixed-width bar filled in eighth-cell steps.
    pub fn progress_bar(&self) -> String {
        render_bar(self.progress(), BAR_WIDTH)
    }

    /// Flattened view with the derived values, as served to clients.
    pub fn report(&self) -> ProgressReport {
        ProgressReport {
            start_time: self.start_time,
            status_time: self.status_time,
            number_to_process: self.number_to_process,
            number_processed: self.number_processed,
            progress: self.progress(),
            progress_rate: self.progress_rate(),
            elapsed_ms: self.elapsed().map(|d| d.num_milliseconds()),
            estimated_completion_time: self.estimated_completion_time(),
            remaining_ms: self.remaining().map(|d| d.num_milliseconds()),
            progress_bar: self.progress_bar(),
        }
    }
}

/// Serializable snapshot of [`ProgressMetrics`] including derived values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub start_time: Option<DateTime<Utc>>,
    pub status_time: Option<DateTime<Utc>>,
    pub number_to_process: u64,
    pub number_processed: u64,
    pub progress: f64,
    pub progress_rate: f64,
    pub elapsed_ms: Option<i64>,
    pub estimated_completion_time: Option<DateTime<Utc>>,
    pub remaining_ms: Option<i64>,
    pub progress_bar: String,
}

fn render_bar(fraction: f64, width: usize) -> String {
    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    let cells = fraction * width as f64;
    let mut full = cells as usize;
    let eighths = ((cells - full as f64) * 8.0) as usize;

    let mut bar = String::with_capacity(width * 3);
    bar.extend(std::iter::repeat(BLOCKS[8]).take(full));
    if full < width && eighths > 0 {
        bar.push(BLOCKS[eighths]);
        full += 1;
    }
    bar.extend(std::iter::repeat(' ').take(width - full));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(start_ms: i64, status_ms: i64, total: u64, done: u64) -> ProgressMetrics {
        let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        ProgressMetrics::new(
            base + TimeDelta::milliseconds(start_ms),
            base + TimeDelta::milliseconds(status_ms),
            total,
            done,
        )
    }

    #[test]
    fn empty_metrics_are_zero() {
        let m = ProgressMetrics::empty();
        assert_eq!(m.progress(), 0.0);
        assert_eq!(m.progress_rate(), 0.0);
        assert!(m.elapsed().is_none());
        assert!(m.estimated_completion_time().is_none());
        assert!(m.remaining().is_none());
        assert_eq!(m.progress_bar(), " ".repeat(BAR_WIDTH));
    }

    #[test]
    fn progress_is_fraction() {
        assert_eq!(at(0, 1000, 200, 50).progress(), 0.25);
        assert_eq!(at(0, 1000, 0, 0).progress(), 0.0);
    }

    #[test]
    fn rate_is_fraction_per_second() {
        let m = at(0, 2000, 100, 50);
        assert!((m.progress_rate() - 0.25).abs() < 1e-9);
        assert_eq!(at(0, 0, 100, 50).progress_rate(), 0.0);
    }

    #[test]
    fn estimates_from_linear_progress() {
        let m = at(0, 10_000, 100, 25);
        assert_eq!(m.estimated_duration(), Some(TimeDelta::seconds(40)));
        assert_eq!(m.remaining(), Some(TimeDelta::seconds(30)));
        assert_eq!(
            m.estimated_completion_time(),
            Some(m.start_time.unwrap() + TimeDelta::seconds(40))
        );
    }

    #[test]
    fn no_estimate_without_progress() {
        let m = at(0, 10_000, 100, 0);
        assert!(m.estimated_duration().is_none());
        assert!(m.remaining().is_none());
    }

    #[test]
    fn bar_is_fixed_width() {
        for done in [0, 1, 33, 50, 99, 100] {
            let bar = at(0, 1, 100, done).progress_bar();
            assert_eq!(bar.chars().count(), BAR_WIDTH);
        }
    }

    #[test]
    fn bar_uses_partial_blocks() {
        let bar = render_bar(0.125 / 100.0 * 5.0, 10);
        // 0.00625 * 10 = 0.0625 cells -> half an eighth, rounds down to empty
        assert_eq!(bar, " ".repeat(10));

        let bar = render_bar(0.55, 10);
        let chars: Vec<char> = bar.chars().collect();
        assert_eq!(&chars[..5], &['█'; 5]);
        assert_eq!(chars[5], '▌');
        assert_eq!(chars[6], ' ');
    }

    #[test]
    fn bar_full_at_completion() {
        assert_eq!(render_bar(1.0, 4), "████");
        assert_eq!(render_bar(1.7, 4), "████");
    }

    #[test]
    fn report_carries_derived_values() {
        let r = at(0, 4000, 10, 5).report();
        assert_eq!(r.progress, 0.5);
        assert_eq!(r.elapsed_ms, Some(4000));
        assert_eq!(r.remaining_ms, Some(4000));
        assert_eq!(r.progress_bar.chars().count(), BAR_WIDTH);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["number_processed"], 5);
    }
}
