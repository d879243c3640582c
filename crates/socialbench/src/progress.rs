//! Console progress bar for data generation.
//!
//! Rendering runs inline with the generator loop; the bar is redrawn only when
//! the displayed percentage changes. The bar is drawn on a sink shared with
//! the runner, so progress and the runner's own lines land in one stream in
//! order.

use std::cell::RefCell;
use std::io::Write;
use std::time::Instant;

const BAR_WIDTH: usize = 50;
const FILL: char = '█';
const EMPTY: char = '-';

/// Output shared between the runner and the progress bar.
pub type ProgressSink<'w> = RefCell<dyn Write + 'w>;

/// Render the bar line for `done` of `total` items.
pub fn render(done: usize, total: usize, width: usize) -> String {
    let (filled, percent) = if total == 0 {
        (width, 100.0)
    } else {
        ((width * done / total).min(width), 100.0 * done as f64 / total as f64)
    };
    let bar: String = std::iter::repeat(FILL)
        .take(filled)
        .chain(std::iter::repeat(EMPTY).take(width - filled))
        .collect();
    format!("Progress: |{bar}| {percent:.1}% Complete")
}

/// Progress over a known number of items.
pub struct Progress<'w> {
    total: usize,
    done: usize,
    last_permille: Option<usize>,
    started: Instant,
    /// None draws nothing.
    out: Option<&'w ProgressSink<'w>>,
}

impl<'w> Progress<'w> {
    /// Start tracking `total` items, drawing on `out` when given.
    pub fn new(total: usize, out: Option<&'w ProgressSink<'w>>) -> Self {
        Self {
            total,
            done: 0,
            last_permille: None,
            started: Instant::now(),
            out,
        }
    }

    /// Record one finished item.
    pub fn tick(&mut self) {
        self.done += 1;
        let Some(out) = self.out else {
            return;
        };
        let permille = if self.total == 0 {
            1000
        } else {
            1000 * self.done / self.total
        };
        if self.last_permille != Some(permille) {
            self.last_permille = Some(permille);
            let mut out = out.borrow_mut();
            let _ = write!(out, "\r{}", render(self.done, self.total, BAR_WIDTH));
            let _ = out.flush();
        }
    }

    /// Close the bar and report elapsed wall-clock time.
    pub fn finish(self) {
        let Some(out) = self.out else {
            return;
        };
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut out = out.borrow_mut();
        if self.last_permille.is_none() {
            let _ = write!(out, "{}", render(self.done, self.total, BAR_WIDTH));
        }
        let _ = write!(out, "\nGenerated in {elapsed:.3} seconds\n\n");
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_half() {
        let line = render(5, 10, 10);
        assert_eq!(line, "Progress: |█████-----| 50.0% Complete");
    }

    #[test]
    fn test_render_empty_total() {
        let line = render(0, 0, 4);
        assert_eq!(line, "Progress: |████| 100.0% Complete");
    }

    #[test]
    fn test_progress_draws_on_sink() {
        let sink = RefCell::new(Vec::<u8>::new());
        {
            let out: &ProgressSink<'_> = &sink;
            let mut progress = Progress::new(2, Some(out));
            progress.tick();
            progress.tick();
            progress.finish();
        }
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.starts_with("\rProgress: |"));
        assert!(text.contains("100.0% Complete\nGenerated in "));
        assert!(text.ends_with(" seconds\n\n"));
    }

    #[test]
    fn test_empty_progress_still_reports() {
        let sink = RefCell::new(Vec::<u8>::new());
        {
            let out: &ProgressSink<'_> = &sink;
            Progress::new(0, Some(out)).finish();
        }
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.starts_with("Progress: |"));
        assert!(text.contains("Generated in "));
    }

    #[test]
    fn test_hidden_progress_writes_nothing() {
        let mut progress = Progress::new(3, None);
        progress.tick();
        progress.finish();
    }
}
