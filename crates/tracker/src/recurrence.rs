//! Recurrence patterns and next-instance computation.
//!
//! A schedule is the sequence `occurrence(0) = start, occurrence(1), ...`.
//! Every occurrence is computed from `start` rather than from the previous
//! occurrence, so monthly schedules keep their day of month: a schedule
//! starting on Jan 31 runs Feb 28 (or 29), then Mar 31.

use chrono::{DateTime, Datelike, Months, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// How often a template repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    /// Every `interval_days` days.
    Custom { interval_days: u32 },
}

/// Recurrence as supplied by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceSpec {
    pub frequency: Frequency,
    /// Multiplier on the frequency (every 2 weeks, every 3 months).
    #[serde(default)]
    pub interval: Option<u32>,
    /// First occurrence; defaults to the creation time.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Last instant an occurrence may fall on.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl RecurrenceSpec {
    /// A pattern with only a frequency.
    #[must_use]
    pub const fn every(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: None,
            start: None,
            end: None,
        }
    }

    /// Validate into a schedule, defaulting `start` to `now`.
    ///
    /// # Errors
    ///
    /// See [`Recurrence::new`].
    pub fn into_recurrence(self, now: DateTime<Utc>) -> Result<Recurrence> {
        Recurrence::new(
            self.frequency,
            self.interval.unwrap_or(1),
            self.start.unwrap_or(now),
            self.end,
        )
    }
}

/// A validated schedule and the generator's position in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    pub interval: u32,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// Index of `next_run` in the schedule.
    pub sequence: u32,
    /// Next occurrence to generate; `None` once the schedule has run out.
    pub next_run: Option<DateTime<Utc>>,
    pub last_generated: Option<DateTime<Utc>>,
}

enum Step {
    Fixed(TimeDelta),
    Months(u32),
}

impl Recurrence {
    /// Build a schedule positioned at its first occurrence.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `interval` or a custom `interval_days`
    /// is zero, or if `end` precedes `start`.
    pub fn new(
        frequency: Frequency,
        interval: u32,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        if interval == 0 {
            return Err(TrackerError::validation("recurrence.interval", "must be at least 1"));
        }
        if let Frequency::Custom { interval_days: 0 } = frequency {
            return Err(TrackerError::validation(
                "recurrence.frequency.interval_days",
                "must be at least 1",
            ));
        }
        if end.is_some_and(|end| end < start) {
            return Err(TrackerError::validation(
                "recurrence.end",
                "must not be before the start",
            ));
        }
        let mut recurrence = Self {
            frequency,
            interval,
            start,
            end,
            sequence: 0,
            next_run: None,
            last_generated: None,
        };
        // Surface arithmetic overflow now rather than on the first tick
        recurrence.step()?;
        recurrence.next_run = recurrence.bounded(recurrence.occurrence(0));
        Ok(recurrence)
    }

    fn step(&self) -> Result<Step> {
        let days = match self.frequency {
            Frequency::Monthly => return Ok(Step::Months(self.interval)),
            Frequency::Daily => i64::from(self.interval),
            Frequency::Weekly => i64::from(self.interval).saturating_mul(7),
            Frequency::Custom { interval_days } => {
                i64::from(self.interval).saturating_mul(i64::from(interval_days))
            }
        };
        TimeDelta::try_days(days)
            .map(Step::Fixed)
            .ok_or_else(|| TrackerError::validation("recurrence.interval", "is too large"))
    }

    /// The `n`th occurrence, ignoring `end`. `None` on overflow.
    #[must_use]
    pub fn occurrence(&self, n: u32) -> Option<DateTime<Utc>> {
        match self.step().ok()? {
            Step::Fixed(step) => {
                let offset = step.checked_mul(i32::try_from(n).ok()?)?;
                self.start.checked_add_signed(offset)
            }
            Step::Months(months) => self
                .start
                .checked_add_months(Months::new(n.checked_mul(months)?)),
        }
    }

    /// Index of the first occurrence strictly after `instant`.
    fn index_after(&self, instant: DateTime<Utc>) -> Option<u32> {
        if instant < self.start {
            return Some(0);
        }
        match self.step().ok()? {
            Step::Fixed(step) => {
                let elapsed = instant.signed_duration_since(self.start).num_seconds();
                let k = elapsed.checked_div(step.num_seconds())?;
                u32::try_from(k.checked_add(1)?).ok()
            }
            Step::Months(months) => {
                let year_diff = i64::from(instant.year()) - i64::from(self.start.year());
                let month_diff = i64::from(instant.month0()) - i64::from(self.start.month0());
                let elapsed_months = year_diff.checked_mul(12)?.checked_add(month_diff)?;
                let mut k = u32::try_from(elapsed_months.checked_div(i64::from(months))?).ok()?;
                // At most two steps: the estimate lands in the same month or earlier
                loop {
                    if self.occurrence(k)? > instant {
                        return Some(k);
                    }
                    k = k.checked_add(1)?;
                }
            }
        }
    }

    fn bounded(&self, occurrence: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        occurrence.filter(|at| self.end.is_none_or(|end| *at <= end))
    }

    /// The first occurrence strictly after `instant`, if it is not past `end`.
    #[must_use]
    pub fn next_after(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.index_after(instant)
            .and_then(|k| self.bounded(self.occurrence(k)))
    }

    /// Whether the schedule has no further occurrences.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.next_run.is_none()
    }

    /// Whether an occurrence is waiting to be generated at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run.is_some_and(|next| next <= now)
    }

    /// Exclusive upper index of occurrences at or before both `now` and `end`.
    fn due_upper(&self, now: DateTime<Utc>) -> Option<u32> {
        let upper = self.index_after(now)?;
        match self.end {
            Some(end) => Some(upper.min(self.index_after(end)?)),
            None => Some(upper),
        }
    }

    /// Occurrences in `[next_run, now]` not past `end`, at most `max`.
    ///
    /// When more than `max` are due the most recent `max` are returned.
    #[must_use]
    pub fn occurrences_due(&self, now: DateTime<Utc>, max: usize) -> Vec<DateTime<Utc>> {
        if !self.is_due(now) {
            return Vec::new();
        }
        let Some(upper) = self.due_upper(now) else {
            return Vec::new();
        };
        let window = u32::try_from(max).unwrap_or(u32::MAX);
        let first = self.sequence.max(upper.saturating_sub(window));
        (first..upper).filter_map(|k| self.occurrence(k)).collect()
    }

    /// Take every occurrence due at `now` (at most `max`) and move
    /// `next_run` past `now`.
    ///
    /// Occurrences older than the `max` most recent ones are skipped.
    pub fn advance(&mut self, now: DateTime<Utc>, max: usize) -> Vec<DateTime<Utc>> {
        if !self.is_due(now) {
            return Vec::new();
        }
        let due = self.occurrences_due(now, max);
        match self.index_after(now) {
            Some(next) => {
                self.sequence = next;
                self.next_run = self.bounded(self.occurrence(next));
            }
            None => self.next_run = None,
        }
        if let Some(last) = due.last() {
            self.last_generated = Some(*last);
        }
        due
    }
}
