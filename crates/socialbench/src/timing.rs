//! Operation durations reported by the backends.
//!
//! Every backend reports in its own unit and format: profiler documents carry
//! integer milliseconds, `SHOW PROFILES` reports seconds, and `EXPLAIN ANALYZE`
//! prints a text line. All of them are normalized here to milliseconds as
//! `f64`. A value that cannot be read becomes [`Timing::Unavailable`]; parsing
//! never fails with an error.

use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// Duration of the most recent backend operation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Timing {
    /// Milliseconds, finite and non-negative.
    Millis(f64),
    /// The backend did not report a readable duration.
    #[default]
    Unavailable,
}

impl Timing {
    /// Milliseconds, rejecting negative and non-finite values.
    pub fn from_millis(ms: f64) -> Self {
        if ms.is_finite() && ms >= 0.0 {
            Timing::Millis(ms)
        } else {
            Timing::Unavailable
        }
    }

    /// Seconds, converted to milliseconds.
    pub fn from_seconds(secs: f64) -> Self {
        Self::from_millis(secs * 1000.0)
    }

    /// Wall-clock duration.
    pub fn from_duration(duration: Duration) -> Self {
        Self::from_millis(duration.as_secs_f64() * 1000.0)
    }

    pub fn as_millis(&self) -> Option<f64> {
        match self {
            Timing::Millis(ms) => Some(*ms),
            Timing::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Timing::Millis(_))
    }
}

impl Add for Timing {
    type Output = Timing;

    /// Sum of two durations; unavailable if either side is.
    fn add(self, rhs: Timing) -> Timing {
        match (self, rhs) {
            (Timing::Millis(a), Timing::Millis(b)) => Timing::from_millis(a + b),
            _ => Timing::Unavailable,
        }
    }
}

impl Sum for Timing {
    fn sum<I: Iterator<Item = Timing>>(iter: I) -> Timing {
        iter.fold(Timing::Millis(0.0), Add::add)
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timing::Millis(ms) => write!(f, "{ms:.3} ms"),
            Timing::Unavailable => f.write_str("N/A ms"),
        }
    }
}

impl Serialize for Timing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_millis().serialize(serializer)
    }
}

/// Parse a number of milliseconds from free text.
pub fn parse_millis(text: &str) -> Timing {
    text.trim()
        .parse::<f64>()
        .map(Timing::from_millis)
        .unwrap_or(Timing::Unavailable)
}

/// Parse a number of seconds from free text (e.g. a `SHOW PROFILES` duration).
pub fn parse_seconds(text: &str) -> Timing {
    text.trim()
        .parse::<f64>()
        .map(Timing::from_seconds)
        .unwrap_or(Timing::Unavailable)
}

/// Extract `Execution Time: X ms` from `EXPLAIN ANALYZE` output.
///
/// PostgreSQL prints it as the last line of the plan; the search runs from the
/// end so plans quoting the phrase elsewhere still resolve to the summary line.
pub fn parse_explain_analyze<S: AsRef<str>>(plan: &[S]) -> Timing {
    plan.iter()
        .rev()
        .find_map(|line| {
            let line = line.as_ref().trim();
            let rest = line.strip_prefix("Execution Time:")?;
            let value = rest.trim().strip_suffix("ms")?;
            Some(parse_millis(value))
        })
        .unwrap_or(Timing::Unavailable)
}

/// Extract the `actual ... rows=N` count of the top plan node.
pub fn parse_explain_rows<S: AsRef<str>>(plan: &[S]) -> Option<usize> {
    let first = plan.first()?.as_ref();
    let actual = &first[first.find("(actual")?..];
    let rows = &actual[actual.find("rows=")? + "rows=".len()..];
    let digits: String = rows.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
