//! Affine index expressions and map iteration ranges.
//!
//! Index expressions appear on the memlets that connect a tasklet to its
//! innermost map; ranges describe the iteration space of one map parameter.
//!
//! Example footprint for `A[i]` where `i` runs over a tile of `tile_i`:
//! ```text
//! tile_i = 0:64:32
//! i      = tile_i:min(tile_i + 32, 64)
//! footprint of i with tile_i fixed = [tile_i, tile_i + 31]  (width 31)
//! ```

use crate::utils::errors::{IrError, IrErrorKind};
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// An affine expression `c0 + sum(c_p * p)` over map parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Affine {
    /// Coefficient of each parameter (zero coefficients are never stored)
    pub terms: BTreeMap<String, i64>,
    /// Constant term
    pub constant: i64,
}

impl Affine {
    /// A constant expression.
    pub fn constant(value: i64) -> Self {
        Self { terms: BTreeMap::new(), constant: value }
    }

    /// A single parameter with coefficient 1.
    pub fn param(name: &str) -> Self {
        Self::scaled(name, 1)
    }

    /// A single parameter with the given coefficient.
    pub fn scaled(name: &str, coeff: i64) -> Self {
        let mut terms = BTreeMap::new();
        if coeff != 0 {
            terms.insert(name.to_string(), coeff);
        }
        Self { terms, constant: 0 }
    }

    /// Coefficient of `param` (0 if absent).
    pub fn coefficient(&self, param: &str) -> i64 {
        self.terms.get(param).copied().unwrap_or(0)
    }

    /// Parameters with a non-zero coefficient.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.terms.keys().map(|s| s.as_str())
    }

    /// Whether the expression mentions `param`.
    pub fn depends_on(&self, param: &str) -> bool {
        self.terms.contains_key(param)
    }

    /// The constant value, if the expression has no parameter terms.
    pub fn as_constant(&self) -> Option<i64> {
        if self.terms.is_empty() {
            Some(self.constant)
        } else {
            None
        }
    }

    pub fn add(&self, other: &Affine) -> Affine {
        let mut result = self.clone();
        for (p, c) in &other.terms {
            *result.terms.entry(p.clone()).or_insert(0) += c;
        }
        result.constant += other.constant;
        result.normalize()
    }

    pub fn sub(&self, other: &Affine) -> Affine {
        self.add(&other.scale(-1))
    }

    pub fn scale(&self, factor: i64) -> Affine {
        let terms = self.terms.iter()
            .map(|(p, c)| (p.clone(), c * factor))
            .collect();
        Affine { terms, constant: self.constant * factor }.normalize()
    }

    pub fn offset(&self, delta: i64) -> Affine {
        let mut result = self.clone();
        result.constant += delta;
        result
    }

    fn normalize(mut self) -> Self {
        self.terms.retain(|_, c| *c != 0);
        self
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (p, &c) in &self.terms {
            let mag = c.abs();
            if first {
                if c < 0 {
                    write!(f, "-")?;
                }
            } else if c < 0 {
                write!(f, " - ")?;
            } else {
                write!(f, " + ")?;
            }
            if mag == 1 {
                write!(f, "{}", p)?;
            } else {
                write!(f, "{}*{}", mag, p)?;
            }
            first = false;
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant > 0 {
            write!(f, " + {}", self.constant)
        } else if self.constant < 0 {
            write!(f, " - {}", -self.constant)
        } else {
            Ok(())
        }
    }
}

impl FromStr for Affine {
    type Err = IrError;

    /// Parses expressions such as `i`, `i + 1`, `2*k - j - 3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IrError::new(IrErrorKind::InvalidKernel, format!("invalid index expression '{}'", s));
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(invalid());
        }

        let mut result = Affine::default();
        let mut term = String::new();
        let mut sign = 1i64;
        let mut chars = compact.chars().peekable();

        let flush = |term: &str, sign: i64, result: &mut Affine| -> Result<(), IrError> {
            if term.is_empty() {
                return Err(invalid());
            }
            let (coeff, name) = match term.split_once('*') {
                Some((c, n)) => (c.parse::<i64>().map_err(|_| invalid())?, n),
                None => (1, term),
            };
            if let Ok(value) = name.parse::<i64>() {
                result.constant += sign * coeff * value;
            } else if name.chars().all(|c| c.is_alphanumeric() || c == '_')
                && name.chars().next().map_or(false, |c| c.is_alphabetic() || c == '_')
            {
                *result.terms.entry(name.to_string()).or_insert(0) += sign * coeff;
            } else {
                return Err(invalid());
            }
            Ok(())
        };

        if let Some(&'-') = chars.peek() {
            sign = -1;
            chars.next();
        }
        while let Some(c) = chars.next() {
            match c {
                '+' | '-' => {
                    flush(&term, sign, &mut result)?;
                    term.clear();
                    sign = if c == '-' { -1 } else { 1 };
                }
                _ => term.push(c),
            }
        }
        flush(&term, sign, &mut result)?;
        Ok(result.normalize())
    }
}

/// Iteration range of one map parameter. The end bound is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Range {
    /// `start:end:step`
    Span { start: i64, end: i64, step: i64 },
    /// One tile: `outer:min(outer + size, end):step`, where `outer` is the
    /// parameter of an enclosing tile map.
    Tile { outer: String, size: i64, end: i64, step: i64 },
}

impl Range {
    /// Unit-stride span.
    pub fn span(start: i64, end: i64) -> Self {
        Range::Span { start, end, step: 1 }
    }

    pub fn step(&self) -> i64 {
        match self {
            Range::Span { step, .. } | Range::Tile { step, .. } => *step,
        }
    }

    /// Same range with its stride multiplied by `factor`.
    pub fn strided(&self, factor: i64) -> Self {
        match self.clone() {
            Range::Span { start, end, step } => Range::Span { start, end, step: step.saturating_mul(factor) },
            Range::Tile { outer, size, end, step } => {
                Range::Tile { outer, size, end, step: step.saturating_mul(factor) }
            }
        }
    }

    /// Whether the bounds mention `param`.
    pub fn depends_on(&self, param: &str) -> bool {
        matches!(self, Range::Tile { outer, .. } if outer == param)
    }

    /// Uniform number of iterations, if every instance of the range runs
    /// the same exact count. `lookup` resolves enclosing parameters.
    pub fn trip_count<'a, F>(&self, lookup: F) -> Option<i64>
    where
        F: Fn(&str) -> Option<&'a Range>,
    {
        match self {
            Range::Span { start, end, step } => {
                let len = end - start;
                if len <= 0 || *step <= 0 || len % step != 0 {
                    return None;
                }
                Some(len / step)
            }
            Range::Tile { outer, size, end, step } => {
                if *step <= 0 || *size <= 0 {
                    return None;
                }
                match lookup(outer)? {
                    Range::Span { start: s, end: e, step: outer_step } => {
                        let uniform = outer_step == size && e == end && (e - s) % size == 0;
                        if !uniform || size % step != 0 {
                            return None;
                        }
                        Some(size / step)
                    }
                    Range::Tile { .. } => None,
                }
            }
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Range::Span { start, end, step } => {
                write!(f, "{}:{}", start, end)?;
                if *step != 1 {
                    write!(f, ":{}", step)?;
                }
                Ok(())
            }
            Range::Tile { outer, size, end, step } => {
                write!(f, "{}:min({} + {}, {})", outer, outer, size, end)?;
                if *step != 1 {
                    write!(f, ":{}", step)?;
                }
                Ok(())
            }
        }
    }
}

/// Value interval `[base, base + width]` of a parameter or index, where
/// `base` is affine in the fixed (enclosing) parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footprint {
    pub base: Affine,
    pub width: i64,
}

/// Footprint of `param` when every parameter in `fixed` is held constant.
///
/// `None` for an unknown parameter or a non-positive stride.
pub fn param_footprint(
    param: &str,
    fixed: &BTreeSet<String>,
    ranges: &BTreeMap<String, Range>,
) -> Option<Footprint> {
    if fixed.contains(param) {
        return Some(Footprint { base: Affine::param(param), width: 0 });
    }
    match ranges.get(param)? {
        Range::Span { step, .. } | Range::Tile { step, .. } if *step <= 0 => None,
        Range::Span { start, end, step } => {
            let last = if end > start { start + ((end - start - 1) / step) * step } else { *start };
            Some(Footprint { base: Affine::constant(*start), width: last - start })
        }
        Range::Tile { outer, size, end, step } => {
            let outer_fp = param_footprint(outer, fixed, ranges)?;
            let mut width = outer_fp.width + ((size - 1) / step) * step;
            if let Some(base) = outer_fp.base.as_constant() {
                width = width.min(end - 1 - base);
            }
            Some(Footprint { base: outer_fp.base, width: width.max(0) })
        }
    }
}

/// Footprint of an index expression when `fixed` parameters are held constant.
pub fn index_footprint(
    index: &Affine,
    fixed: &BTreeSet<String>,
    ranges: &BTreeMap<String, Range>,
) -> Option<Footprint> {
    let mut base = Affine::constant(index.constant);
    let mut width = 0;
    for (p, &c) in &index.terms {
        let fp = param_footprint(p, fixed, ranges)?;
        if c >= 0 {
            base = base.add(&fp.base.scale(c));
        } else {
            base = base.add(&fp.base.scale(c)).offset(c * fp.width);
        }
        width += c.abs() * fp.width;
    }
    Some(Footprint { base, width })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_and_display() {
        let e: Affine = "2*k - j + 3".parse().unwrap();
        assert_eq!(e.coefficient("k"), 2);
        assert_eq!(e.coefficient("j"), -1);
        assert_eq!(e.constant, 3);
        assert_eq!(e.to_string(), "-j + 2*k + 3");

        let e: Affine = "-i - 1".parse().unwrap();
        assert_eq!(e.to_string(), "-i - 1");
        assert!("i +".parse::<Affine>().is_err());
        assert!("3x".parse::<Affine>().is_err());
    }

    #[test]
    fn test_trip_count() {
        let outer = Range::Span { start: 0, end: 64, step: 16 };
        let tile = Range::Tile { outer: "ti".into(), size: 16, end: 64, step: 1 };
        assert_eq!(tile.trip_count(|p| if p == "ti" { Some(&outer) } else { None }), Some(16));

        let ragged_outer = Range::Span { start: 0, end: 60, step: 16 };
        let ragged = Range::Tile { outer: "ti".into(), size: 16, end: 60, step: 1 };
        assert_eq!(ragged.trip_count(|_| Some(&ragged_outer)), None);

        assert_eq!(Range::span(0, 7).trip_count(|_| None), Some(7));
        assert_eq!(Range::Span { start: 0, end: 7, step: 2 }.trip_count(|_| None), None);

        let stalled = Range::Span { start: 0, end: 8, step: 0 };
        assert_eq!(stalled.trip_count(|_| None), None);
        let empty_tile = Range::Tile { outer: "ti".into(), size: 0, end: 8, step: 1 };
        let zero_outer = Range::Span { start: 0, end: 8, step: 0 };
        assert_eq!(empty_tile.trip_count(|_| Some(&zero_outer)), None);
    }

    #[test]
    fn test_footprint_of_zero_stride() {
        let mut ranges = BTreeMap::new();
        ranges.insert("k".to_string(), Range::Span { start: 0, end: 8, step: 0 });
        ranges.insert("i".to_string(), Range::Tile { outer: "ti".into(), size: 4, end: 8, step: 0 });
        assert_eq!(param_footprint("k", &set(&[]), &ranges), None);
        assert_eq!(param_footprint("i", &set(&["ti"]), &ranges), None);
        assert!(index_footprint(&"k + 1".parse().unwrap(), &set(&[]), &ranges).is_none());
    }

    #[test]
    fn test_footprint_of_tile() {
        let mut ranges = BTreeMap::new();
        ranges.insert("ti".to_string(), Range::Span { start: 0, end: 64, step: 8 });
        ranges.insert("i".to_string(), Range::Tile { outer: "ti".into(), size: 8, end: 64, step: 1 });
        ranges.insert("k".to_string(), Range::span(0, 32));

        let fp = index_footprint(&"i".parse().unwrap(), &set(&["ti"]), &ranges).unwrap();
        assert_eq!(fp.base, Affine::param("ti"));
        assert_eq!(fp.width, 7);

        // Nothing fixed: the tile covers the whole range.
        let fp = index_footprint(&"i".parse().unwrap(), &set(&[]), &ranges).unwrap();
        assert_eq!(fp.base, Affine::constant(0));
        assert_eq!(fp.width, 63);

        let fp = index_footprint(&"-k + 40".parse().unwrap(), &set(&[]), &ranges).unwrap();
        assert_eq!(fp.base, Affine::constant(9));
        assert_eq!(fp.width, 31);
    }
}
