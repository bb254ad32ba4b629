//! Offline evaluation of predictions against labeled data
//!
//! Produces accuracy, a confusion matrix and per-class precision / recall /
//! F1 with macro and support-weighted averages. Classes are the sorted union
//! of actual and predicted labels.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Per-class metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub class: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Evaluation report over a set of (actual, predicted) label pairs
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    /// Class labels, sorted; indexes the confusion matrix
    pub classes: Vec<String>,

    /// `confusion[actual][predicted]` counts
    pub confusion: Vec<Vec<usize>>,

    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub total: usize,
}

impl EvaluationReport {
    /// Build a report from (actual, predicted) pairs
    pub fn from_pairs<I, A, P>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, P)>,
        A: Into<String>,
        P: Into<String>,
    {
        let pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(a, p)| (a.into(), p.into()))
            .collect();

        let classes: Vec<String> = pairs
            .iter()
            .flat_map(|(a, p)| [a.clone(), p.clone()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let index = |label: &str| classes.iter().position(|c| c == label).unwrap_or(0);

        let n = classes.len();
        let mut confusion = vec![vec![0usize; n]; n];
        for (actual, predicted) in &pairs {
            confusion[index(actual)][index(predicted)] += 1;
        }

        let correct: usize = (0..n).map(|i| confusion[i][i]).sum();
        let total = pairs.len();

        let per_class = classes
            .iter()
            .enumerate()
            .map(|(i, class)| {
                let tp = confusion[i][i];
                let support: usize = confusion[i].iter().sum();
                let predicted: usize = confusion.iter().map(|row| row[i]).sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    class: class.clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        Self {
            classes,
            confusion,
            per_class,
            accuracy: ratio(correct, total),
            total,
        }
    }

    /// Unweighted mean of (precision, recall, f1) over classes
    pub fn macro_avg(&self) -> (f64, f64, f64) {
        let n = self.per_class.len();
        if n == 0 {
            return (0.0, 0.0, 0.0);
        }
        let sum = self.per_class.iter().fold((0.0, 0.0, 0.0), |acc, m| {
            (acc.0 + m.precision, acc.1 + m.recall, acc.2 + m.f1)
        });
        let n = n as f64;
        (sum.0 / n, sum.1 / n, sum.2 / n)
    }

    /// Support-weighted mean of (precision, recall, f1)
    pub fn weighted_avg(&self) -> (f64, f64, f64) {
        if self.total == 0 {
            return (0.0, 0.0, 0.0);
        }
        let sum = self.per_class.iter().fold((0.0, 0.0, 0.0), |acc, m| {
            let w = m.support as f64;
            (
                acc.0 + m.precision * w,
                acc.1 + m.recall * w,
                acc.2 + m.f1 * w,
            )
        });
        let total = self.total as f64;
        (sum.0 / total, sum.1 / total, sum.2 / total)
    }

    pub fn class(&self, class: &str) -> Option<&ClassMetrics> {
        self.per_class.iter().find(|m| m.class == class)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(String::len)
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(12);

        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        writeln!(f)?;
        writeln!(f, "Confusion Matrix:")?;
        for row in &self.confusion {
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            writeln!(f, "[{}]", cells.join(" "))?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "{:>width$} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                m.class, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>10} {:>10} {:>10.4} {:>10}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        let (p, r, f1) = self.macro_avg();
        writeln!(
            f,
            "{:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10}",
            "macro avg", p, r, f1, self.total
        )?;
        let (p, r, f1) = self.weighted_avg();
        write!(
            f,
            "{:>width$} {:>10.4} {:>10.4} {:>10.4} {:>10}",
            "weighted avg", p, r, f1, self.total
        )
    }
}
