//! Category frequency summaries for the column chart
//!
//! Turns the backend's label -> count map into a bounded chart series and the
//! labels tied for the highest and lowest counts. Every function here is a pure
//! transform over the map it is given.

use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cmp::Ordering;

/// Raw label -> count map, in the order the backend produced it
pub type FrequencyMap = Map<String, Value>;

/// Label the backend uses for null/unknown values
pub const MISSING_LABEL: &str = "Missing";
/// Synthetic bucket holding everything past the top-K
pub const OTHER_LABEL: &str = "Other";
/// Reported when no numeric count exists to rank
pub const UNDEFINED_LABEL: &str = "undefined";

/// One bar of the chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartEntry {
    pub label: String,
    pub count: f64,
}

impl ChartEntry {
    pub fn new<S: Into<String>>(label: S, count: f64) -> Self {
        Self {
            label: label.into(),
            count,
        }
    }
}

/// Labels sharing the maximum and the minimum count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extremes {
    pub highest: Vec<String>,
    pub lowest: Vec<String>,
}

impl Extremes {
    fn undefined() -> Self {
        Self {
            highest: vec![UNDEFINED_LABEL.to_string()],
            lowest: vec![UNDEFINED_LABEL.to_string()],
        }
    }

    /// True when the map had nothing numeric to rank
    pub fn is_undefined(&self) -> bool {
        self.highest.len() == 1 && self.highest[0] == UNDEFINED_LABEL
    }
}

/// Coerce a count to a number the way the chart does
///
/// Null and blank strings count as zero, booleans as 0/1, numeric strings are
/// parsed, anything else is NaN. Only the exact spelling `Infinity` yields an
/// infinite count; `inf` or `nan` in other spellings are NaN.
pub fn coerce_count(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let s = s.trim();
            match s {
                "" => 0.0,
                "Infinity" | "+Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                _ => s
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .unwrap_or(f64::NAN),
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Service for frequency summaries
pub struct FrequencyService;

impl FrequencyService {
    /// Drop the missing-value bucket unless `include_missing` is set
    ///
    /// The reserved label is matched case-insensitively. The input map is never
    /// modified; when nothing needs removing it is borrowed back unchanged.
    pub fn filter_missing(map: &FrequencyMap, include_missing: bool) -> Cow<'_, FrequencyMap> {
        if include_missing || !map.keys().any(|k| is_missing_label(k)) {
            return Cow::Borrowed(map);
        }
        Cow::Owned(
            map.iter()
                .filter(|(k, _)| !is_missing_label(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Keep the `k` largest buckets and fold the remainder into "Other"
    ///
    /// Ties keep map order. An entry tied with the k-th one is still folded
    /// when it sorts past position k. Non-numeric counts sort last and add
    /// nothing to the "Other" sum.
    pub fn bucket_top_k(map: &FrequencyMap, k: usize) -> Vec<ChartEntry> {
        let mut entries: Vec<ChartEntry> = map
            .iter()
            .map(|(label, value)| ChartEntry::new(label.as_str(), coerce_count(value)))
            .collect();
        entries.sort_by(|a, b| descending(a.count, b.count));

        if entries.len() <= k {
            return entries;
        }

        let rest = entries.split_off(k);
        let other: f64 = rest
            .iter()
            .map(|e| e.count)
            .filter(|c| !c.is_nan())
            .sum();
        entries.push(ChartEntry::new(OTHER_LABEL, other));
        entries
    }

    /// Labels tied for the highest and the lowest numeric count
    ///
    /// Returns the `"undefined"` sentinel for both sides when the map is empty
    /// or holds no numeric counts.
    pub fn extremes(map: &FrequencyMap) -> Extremes {
        let numeric: Vec<(&str, f64)> = map
            .iter()
            .map(|(label, value)| (label.as_str(), coerce_count(value)))
            .filter(|(_, count)| !count.is_nan())
            .collect();

        if numeric.is_empty() {
            return Extremes::undefined();
        }

        let max = numeric.iter().map(|(_, c)| *c).fold(f64::NEG_INFINITY, f64::max);
        let min = numeric.iter().map(|(_, c)| *c).fold(f64::INFINITY, f64::min);
        let labels_at = |target: f64| {
            numeric
                .iter()
                .filter(|(_, c)| *c == target)
                .map(|(label, _)| label.to_string())
                .collect::<Vec<_>>()
        };

        Extremes {
            highest: labels_at(max),
            lowest: labels_at(min),
        }
    }

    /// Join tied labels, eliding the middle of long lists
    ///
    /// `["a", "b", "c", "d"]` with `max_shown = 2` renders as `"a, b, ..., d"`.
    pub fn format_tied_labels<S: AsRef<str>>(labels: &[S], max_shown: usize) -> String {
        if labels.len().saturating_sub(1) <= max_shown {
            return join(labels);
        }
        let mut shown = join(&labels[..max_shown]);
        if !shown.is_empty() {
            shown.push_str(", ");
        }
        shown.push_str("..., ");
        shown.push_str(labels[labels.len() - 1].as_ref());
        shown
    }
}

/// Options for [`ColumnSummary::build`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryOptions {
    pub include_missing: bool,
    pub top_k: usize,
    pub tied_shown: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            include_missing: true,
            top_k: 10,
            tied_shown: 2,
        }
    }
}

/// Everything the chart card renders for one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    /// Buckets left after the missing filter
    pub categories: usize,
    pub series: Vec<ChartEntry>,
    pub extremes: Extremes,
    pub highest: String,
    pub lowest: String,
}

impl ColumnSummary {
    pub fn build(map: &FrequencyMap, options: &SummaryOptions) -> Self {
        let filtered = FrequencyService::filter_missing(map, options.include_missing);
        let series = FrequencyService::bucket_top_k(&filtered, options.top_k);
        let extremes = FrequencyService::extremes(&filtered);
        let highest = FrequencyService::format_tied_labels(&extremes.highest, options.tied_shown);
        let lowest = FrequencyService::format_tied_labels(&extremes.lowest, options.tied_shown);

        Self {
            categories: filtered.len(),
            series,
            extremes,
            highest,
            lowest,
        }
    }

    /// Nothing left to chart after filtering
    pub fn is_empty(&self) -> bool {
        self.categories == 0
    }
}

fn is_missing_label(label: &str) -> bool {
    label.eq_ignore_ascii_case(MISSING_LABEL)
}

fn descending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

fn join<S: AsRef<str>>(labels: &[S]) -> String {
    labels
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}
