//! Classification metrics derived from a confusion matrix.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Counts indexed as `[actual][predicted]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(classes: usize) -> Self {
        Self {
            counts: vec![vec![0; classes]; classes],
        }
    }

    pub fn classes(&self) -> usize {
        self.counts.len()
    }

    /// Counts one prediction. Labels outside the matrix leave it untouched.
    pub fn record(&mut self, actual: usize, predicted: usize) -> Result<()> {
        let classes = self.classes();
        if let Some(label) = [actual, predicted].into_iter().find(|&label| label >= classes) {
            return Err(Error::LabelOutOfRange { label, classes });
        }

        self.counts[actual][predicted] += 1;
        Ok(())
    }

    pub fn counts(&self) -> &[Vec<usize>] {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.classes()).map(|i| self.counts[i][i]).sum()
    }

    /// Percentage of correct predictions, 0 when nothing was recorded.
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total()) * 100.
    }

    pub fn precision(&self, class: usize) -> f64 {
        let predicted: usize = self.counts.iter().map(|row| row[class]).sum();
        ratio(self.counts[class][class], predicted)
    }

    pub fn recall(&self, class: usize) -> f64 {
        let actual: usize = self.counts[class].iter().sum();
        ratio(self.counts[class][class], actual)
    }

    pub fn f1(&self, class: usize) -> f64 {
        let precision = self.precision(class);
        let recall = self.recall(class);

        if precision + recall > 0. {
            2. * precision * recall / (precision + recall)
        } else {
            0.
        }
    }

    pub fn macro_precision(&self) -> f64 {
        self.macro_average(Self::precision)
    }

    pub fn macro_recall(&self) -> f64 {
        self.macro_average(Self::recall)
    }

    pub fn macro_f1(&self) -> f64 {
        self.macro_average(Self::f1)
    }

    fn macro_average(&self, metric: fn(&Self, usize) -> f64) -> f64 {
        if self.classes() == 0 {
            return 0.;
        }

        (0..self.classes()).map(|class| metric(self, class)).sum::<f64>() / self.classes() as f64
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.
    } else {
        numerator as f64 / denominator as f64
    }
}
