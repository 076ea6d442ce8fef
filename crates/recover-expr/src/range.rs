//! Integer intervals with a finite exclusion set.

use std::fmt;

use rustc_hash::FxHashSet;

/// One end of a range: a finite value or infinity in that end's direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bound {
    Infinite,
    Finite(i128),
}

impl Bound {
    /// Get the finite value, if any.
    pub const fn finite(self) -> Option<i128> {
        match self {
            Self::Finite(v) => Some(v),
            Self::Infinite => None,
        }
    }

    fn map(self, f: impl FnOnce(i128) -> i128) -> Self {
        match self {
            Self::Finite(v) => Self::Finite(f(v)),
            Self::Infinite => Self::Infinite,
        }
    }
}

/// Closed integer interval, possibly unbounded on either side, with excluded values.
///
/// Ranges are immutable: every operation returns a new range. Construction
/// canonicalizes, so `minimum > maximum` yields the single empty range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Range {
    empty: bool,
    minimum: Bound,
    maximum: Bound,
    excluded: FxHashSet<i128>,
}

impl Default for Range {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Range {
    /// The unconstrained range `]-oo, +oo[`.
    pub fn unbounded() -> Self {
        Self {
            empty: false,
            minimum: Bound::Infinite,
            maximum: Bound::Infinite,
            excluded: FxHashSet::default(),
        }
    }

    /// The empty range.
    pub fn empty() -> Self {
        Self {
            empty: true,
            ..Self::unbounded()
        }
    }

    /// `[minimum, maximum]` with no exclusions, empty when the bounds cross.
    pub fn new(minimum: Bound, maximum: Bound) -> Self {
        Self::with_excluded(minimum, maximum, [])
    }

    /// Create a range with excluded values.
    pub fn with_excluded(
        minimum: Bound,
        maximum: Bound,
        excluded: impl IntoIterator<Item = i128>,
    ) -> Self {
        if let (Bound::Finite(lo), Bound::Finite(hi)) = (minimum, maximum) {
            if lo > hi {
                return Self::empty();
            }
        }
        Self {
            empty: false,
            minimum,
            maximum,
            excluded: excluded.into_iter().collect(),
        }
    }

    /// `]-oo, max]`.
    pub fn at_most(max: i128) -> Self {
        Self::new(Bound::Infinite, Bound::Finite(max))
    }

    /// `[min, +oo[`.
    pub fn at_least(min: i128) -> Self {
        Self::new(Bound::Finite(min), Bound::Infinite)
    }

    /// `[min, max]`, empty when `min > max`.
    pub fn between(min: i128, max: i128) -> Self {
        Self::new(Bound::Finite(min), Bound::Finite(max))
    }

    /// The range holding only `value`.
    pub fn single(value: i128) -> Self {
        Self::between(value, value)
    }

    /// Whether no value is admissible.
    pub const fn is_empty(&self) -> bool {
        self.empty
    }

    /// No finite lower bound.
    pub const fn is_unbounded_negative(&self) -> bool {
        !self.empty && matches!(self.minimum, Bound::Infinite)
    }

    /// No finite upper bound.
    pub const fn is_unbounded_positive(&self) -> bool {
        !self.empty && matches!(self.maximum, Bound::Infinite)
    }

    /// Unbounded in both directions. Exclusions are allowed.
    pub const fn is_unbounded(&self) -> bool {
        self.is_unbounded_negative() && self.is_unbounded_positive()
    }

    /// Lower bound, or `None` for the empty range.
    pub const fn minimum(&self) -> Option<Bound> {
        if self.empty { None } else { Some(self.minimum) }
    }

    /// Upper bound, or `None` for the empty range.
    pub const fn maximum(&self) -> Option<Bound> {
        if self.empty { None } else { Some(self.maximum) }
    }

    /// Finite lower bound, if any.
    pub const fn finite_minimum(&self) -> Option<i128> {
        match self.minimum() {
            Some(bound) => bound.finite(),
            None => None,
        }
    }

    /// Finite upper bound, if any.
    pub const fn finite_maximum(&self) -> Option<i128> {
        match self.maximum() {
            Some(bound) => bound.finite(),
            None => None,
        }
    }

    /// Values removed from inside the bounds.
    pub const fn excluded(&self) -> &FxHashSet<i128> {
        &self.excluded
    }

    /// Check `value` against the bounds only, ignoring exclusions.
    pub fn within_bounds(&self, value: i128) -> bool {
        if self.empty {
            return false;
        }
        let above_min = match self.minimum {
            Bound::Finite(lo) => value >= lo,
            Bound::Infinite => true,
        };
        let below_max = match self.maximum {
            Bound::Finite(hi) => value <= hi,
            Bound::Infinite => true,
        };
        above_min && below_max
    }

    /// Check that `value` is inside the bounds and not excluded.
    pub fn contains(&self, value: i128) -> bool {
        self.within_bounds(value) && !self.excluded.contains(&value)
    }

    /// Shift both bounds and every excluded value by `k`.
    #[must_use]
    pub fn add(&self, k: i128) -> Self {
        if self.empty {
            return Self::empty();
        }
        Self::with_excluded(
            self.minimum.map(|v| v.saturating_add(k)),
            self.maximum.map(|v| v.saturating_add(k)),
            self.excluded.iter().map(|v| v.saturating_add(k)),
        )
    }

    /// Shift both bounds and every excluded value by `-k`.
    #[must_use]
    pub fn sub(&self, k: i128) -> Self {
        self.add(k.saturating_neg())
    }

    /// Divide both bounds and every excluded value by `k`, truncating.
    ///
    /// Dividing by zero gives no information and yields the unconstrained range.
    /// A negative divisor swaps the bounds.
    #[must_use]
    pub fn div(&self, k: i128) -> Self {
        if self.empty {
            return Self::empty();
        }
        if k == 0 {
            return Self::unbounded();
        }
        let mut minimum = self.minimum.map(|v| v.saturating_div(k));
        let mut maximum = self.maximum.map(|v| v.saturating_div(k));
        if k < 0 {
            std::mem::swap(&mut minimum, &mut maximum);
        }
        Self::with_excluded(
            minimum,
            maximum,
            self.excluded.iter().map(|v| v.saturating_div(k)),
        )
    }

    /// Intersect two ranges. Exclusions from both sides survive when they fall
    /// inside the resulting bounds.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        if self.empty || other.empty {
            return Self::empty();
        }
        let minimum = match (self.minimum, other.minimum) {
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a.max(b)),
            (Bound::Finite(a), Bound::Infinite) | (Bound::Infinite, Bound::Finite(a)) => {
                Bound::Finite(a)
            }
            (Bound::Infinite, Bound::Infinite) => Bound::Infinite,
        };
        let maximum = match (self.maximum, other.maximum) {
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a.min(b)),
            (Bound::Finite(a), Bound::Infinite) | (Bound::Infinite, Bound::Finite(a)) => {
                Bound::Finite(a)
            }
            (Bound::Infinite, Bound::Infinite) => Bound::Infinite,
        };
        let bounds = Self::new(minimum, maximum);
        if bounds.empty {
            return bounds;
        }
        let excluded: Vec<i128> = self
            .excluded
            .iter()
            .chain(&other.excluded)
            .copied()
            .filter(|&v| bounds.within_bounds(v))
            .collect();
        Self::with_excluded(minimum, maximum, excluded)
    }

    /// Whether the two ranges share an admissible value.
    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Keep the candidate values that lie in this range.
    pub fn contained_of(&self, values: &FxHashSet<i128>) -> FxHashSet<i128> {
        values.iter().copied().filter(|&v| self.contains(v)).collect()
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.empty {
            return write!(f, "{{}}");
        }
        match self.minimum {
            Bound::Finite(v) => write!(f, "[{v}, ")?,
            Bound::Infinite => write!(f, "]-oo, ")?,
        }
        match self.maximum {
            Bound::Finite(v) => write!(f, "{v}]")?,
            Bound::Infinite => write!(f, "+oo[")?,
        }
        if !self.excluded.is_empty() {
            let mut excluded: Vec<_> = self.excluded.iter().collect();
            excluded.sort_unstable();
            write!(f, " \\ {{")?;
            for (i, v) in excluded.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{v}")?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}
