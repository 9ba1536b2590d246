//! Per-category and overall score means over the result store.

use super::record::ScoredRecord;
use super::store::{Records, write_atomic};
use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::warn;

/// Mean of each score dimension over a group of records.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreMeans {
    pub similarity_score: f64,
    pub overlap_f1: f64,
    pub judge_score: f64,
    pub count: usize,
}

/// Derived summary of a result store. Recomputed every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    /// Means per category, ascending by category.
    pub categories: BTreeMap<i64, ScoreMeans>,
    /// Straight per-item means across every record.
    pub overall: ScoreMeans,
}

#[derive(Default)]
struct Sums {
    similarity: f64,
    f1: f64,
    judge: f64,
    count: usize,
}

impl Sums {
    fn add(&mut self, similarity: f64, f1: f64, judge: i64) {
        self.similarity += similarity;
        self.f1 += f1;
        self.judge += judge as f64;
        self.count += 1;
    }

    fn means(&self) -> ScoreMeans {
        if self.count == 0 {
            return ScoreMeans::default();
        }
        let n = self.count as f64;
        ScoreMeans {
            similarity_score: round4(self.similarity / n),
            overlap_f1: round4(self.f1 / n),
            judge_score: round4(self.judge / n),
            count: self.count,
        }
    }
}

/// Aggregate every record into category and overall means.
///
/// Fails with [`EvalError::AggregationType`] if any category cannot be
/// coerced to an integer. Unusable score values fall back to 0 with a warning.
pub fn aggregate(records: &Records) -> Result<AggregateReport> {
    let mut keyed = Vec::with_capacity(records.len());
    for (id, record) in records {
        let category = coerce_category(&record.category).ok_or_else(|| {
            EvalError::AggregationType {
                id: id.clone(),
                value: record.category.to_string(),
            }
        })?;
        keyed.push((category, id, record));
    }

    let mut groups: BTreeMap<i64, Sums> = BTreeMap::new();
    let mut overall = Sums::default();

    for (category, id, record) in keyed {
        let (similarity, f1, judge) = coerce_scores(id, record);
        groups.entry(category).or_default().add(similarity, f1, judge);
        overall.add(similarity, f1, judge);
    }

    Ok(AggregateReport {
        categories: groups.iter().map(|(c, sums)| (*c, sums.means())).collect(),
        overall: overall.means(),
    })
}

fn coerce_scores(id: &str, record: &ScoredRecord) -> (f64, f64, i64) {
    let similarity = coerce_f64(&record.similarity_score).unwrap_or_else(|| {
        warn!(id = %id, value = %record.similarity_score, "similarity_score is not numeric, using 0.0");
        0.0
    });
    let f1 = coerce_f64(&record.overlap_f1).unwrap_or_else(|| {
        warn!(id = %id, value = %record.overlap_f1, "overlap_f1 is not numeric, using 0.0");
        0.0
    });
    let judge = coerce_judge(&record.judge_score).unwrap_or_else(|| {
        warn!(id = %id, value = %record.judge_score, "judge_score is not an integer, using 0");
        0
    });
    (similarity, f1, judge)
}

/// Integer category from an integer, an integral float or a numeric string.
pub fn coerce_category(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn coerce_judge(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|v| v.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// `v` as an `i64` when it is a whole number inside the `i64` range.
fn integral(v: f64) -> Option<i64> {
    let in_range = v >= i64::MIN as f64 && v < i64::MAX as f64;
    (v.is_finite() && v.fract() == 0.0 && in_range).then_some(v as i64)
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

impl AggregateReport {
    /// Plain-text report: per-category table, then overall means.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("Mean Scores Per Category:\n");
        let _ = writeln!(
            out,
            "{:<10}{:>18}{:>12}{:>13}{:>7}",
            "category", "similarity_score", "overlap_f1", "judge_score", "count"
        );
        for (category, means) in &self.categories {
            let _ = writeln!(
                out,
                "{:<10}{:>18.4}{:>12.4}{:>13.4}{:>7}",
                category, means.similarity_score, means.overlap_f1, means.judge_score, means.count
            );
        }

        out.push_str("\nOverall Mean Scores:\n");
        let _ = writeln!(out, "{:<18}{:.4}", "similarity_score", self.overall.similarity_score);
        let _ = writeln!(out, "{:<18}{:.4}", "overlap_f1", self.overall.overlap_f1);
        let _ = writeln!(out, "{:<18}{:.4}", "judge_score", self.overall.judge_score);

        out
    }

    /// Write the rendered report to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.render().as_bytes())
    }

    /// Write the report as pretty JSON to `path`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| EvalError::Serialization(e.to_string()))?;
        write_atomic(path, &data)
    }
}
