//! Choice generators
//!
//! A choice generator (CG) is one branching point of the search tree: a finite, ordered set of
//! alternatives. The search advances through the alternatives one at a time, restoring the state
//! saved when the CG was registered before exploring each one.

use super::{Error, ThreadId};
use std::fmt::Debug;

/// One alternative of a choice generator
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Choice {
    /// Run this thread next
    Thread(ThreadId),
    Boolean(bool),
    Int(i32),
}

pub trait ChoiceGenerator: Debug {
    /// Stable identifier of the kind of decision (eg. `SHARED_OBJECT` or `verifyGetBoolean`)
    fn id(&self) -> &'static str;

    fn has_more_choices(&self) -> bool;

    /// Move on to the next choice
    fn advance(&mut self);

    /// Current choice (`None` before the first `advance`)
    fn next_choice(&self) -> Option<Choice>;

    /// Go back to before the first choice
    fn reset(&mut self);

    fn total_choices(&self) -> usize;

    /// Number of choices advanced through so far
    fn processed_choices(&self) -> usize;

    /// Does picking a choice mean switching the current thread?
    fn is_scheduling_point(&self) -> bool {
        false
    }
}

/// Choose which thread runs next
#[derive(Clone, Debug)]
pub struct ThreadChoiceFromSet {
    id: &'static str,
    threads: Vec<ThreadId>,
    processed: usize,
    is_scheduling_point: bool,
}

impl ThreadChoiceFromSet {
    pub fn new(id: &'static str, threads: Vec<ThreadId>, is_scheduling_point: bool) -> Self {
        ThreadChoiceFromSet {
            id,
            threads,
            processed: 0,
            is_scheduling_point,
        }
    }

    pub fn threads(&self) -> &[ThreadId] {
        &self.threads
    }
}

impl ChoiceGenerator for ThreadChoiceFromSet {
    fn id(&self) -> &'static str {
        self.id
    }

    fn has_more_choices(&self) -> bool {
        self.processed < self.threads.len()
    }

    fn advance(&mut self) {
        if self.has_more_choices() {
            self.processed += 1;
        }
    }

    fn next_choice(&self) -> Option<Choice> {
        let idx = self.processed.checked_sub(1)?;
        self.threads.get(idx).copied().map(Choice::Thread)
    }

    fn reset(&mut self) {
        self.processed = 0;
    }

    fn total_choices(&self) -> usize {
        self.threads.len()
    }

    fn processed_choices(&self) -> usize {
        self.processed
    }

    fn is_scheduling_point(&self) -> bool {
        self.is_scheduling_point
    }
}

/// Choose `false` and `true` (in that order, unless flipped)
#[derive(Clone, Debug)]
pub struct BooleanChoiceGenerator {
    id: &'static str,
    false_first: bool,
    processed: usize,
}

impl BooleanChoiceGenerator {
    pub fn new(id: &'static str) -> Self {
        BooleanChoiceGenerator {
            id,
            false_first: true,
            processed: 0,
        }
    }

    pub fn true_first(id: &'static str) -> Self {
        BooleanChoiceGenerator {
            id,
            false_first: false,
            processed: 0,
        }
    }
}

impl ChoiceGenerator for BooleanChoiceGenerator {
    fn id(&self) -> &'static str {
        self.id
    }

    fn has_more_choices(&self) -> bool {
        self.processed < 2
    }

    fn advance(&mut self) {
        if self.has_more_choices() {
            self.processed += 1;
        }
    }

    fn next_choice(&self) -> Option<Choice> {
        match self.processed {
            1 => Some(Choice::Boolean(!self.false_first)),
            2 => Some(Choice::Boolean(self.false_first)),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.processed = 0;
    }

    fn total_choices(&self) -> usize {
        2
    }

    fn processed_choices(&self) -> usize {
        self.processed
    }
}

/// Choose each of `min`, `min + delta`, ... up to `max`
#[derive(Clone, Debug)]
pub struct IntIntervalGenerator {
    id: &'static str,
    min: i32,
    delta: i32,
    count: usize,
    processed: usize,
}

impl IntIntervalGenerator {
    /// The interval must be finite and non-empty: `delta` goes from `min` towards `max`
    pub fn new(id: &'static str, min: i32, max: i32, delta: i32) -> Result<Self, Error> {
        let bad_range = || Error::BadChoiceRange { min, max, delta };
        if delta == 0 || (delta > 0 && min > max) || (delta < 0 && min < max) {
            return Err(bad_range());
        }
        let steps = (i64::from(max) - i64::from(min)) / i64::from(delta);
        let count = usize::try_from(steps + 1).map_err(|_| bad_range())?;
        Ok(IntIntervalGenerator {
            id,
            min,
            delta,
            count,
            processed: 0,
        })
    }
}

impl ChoiceGenerator for IntIntervalGenerator {
    fn id(&self) -> &'static str {
        self.id
    }

    fn has_more_choices(&self) -> bool {
        self.processed < self.count
    }

    fn advance(&mut self) {
        if self.has_more_choices() {
            self.processed += 1;
        }
    }

    fn next_choice(&self) -> Option<Choice> {
        let idx = self.processed.checked_sub(1)? as i64;
        let value = i64::from(self.min) + idx * i64::from(self.delta);
        i32::try_from(value).ok().map(Choice::Int)
    }

    fn reset(&mut self) {
        self.processed = 0;
    }

    fn total_choices(&self) -> usize {
        self.count
    }

    fn processed_choices(&self) -> usize {
        self.processed
    }
}

/// A choice that was made along the current path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceRecord {
    pub id: &'static str,
    pub choice: Choice,

    /// Index of the choice in its generator
    pub index: usize,
    pub total: usize,
}
