// ========================================================================================
//                         Centroid predictors over marker dosages
// ========================================================================================

use crate::types::EvalError;
use ahash::AHashMap;
use itertools::Itertools;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// How a trained predictor turns distances to group centroids into confidences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Calls the closest centroid when it beats the runner-up by at least the threshold.
    #[default]
    NearestWithMargin,
    /// Every pair of centroids votes for the closer one; confidences are vote shares.
    PairwiseVote,
}

/// Label to confidence mapping, sorted by label. Empty means "no call".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prediction {
    entries: Vec<(String, f64)>,
}

impl Prediction {
    fn certain(label: &str) -> Self {
        Self {
            entries: vec![(label.to_owned(), 1.0)],
        }
    }

    /// Confidence assigned to `label`, if any.
    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries
            .binary_search_by(|(candidate, _)| candidate.as_str().cmp(label))
            .ok()
            .map(|at| self.entries[at].1)
    }

    /// Confidence assigned to `label`, 0 when absent.
    pub fn confidence(&self, label: &str) -> f64 {
        self.get(label).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries
            .iter()
            .map(|(label, confidence)| (label.as_str(), *confidence))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Validated predictor settings; trains one [`Predictor`] per call to [`build`](Self::build).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorFactory {
    strategy: Strategy,
    threshold: f64,
}

impl PredictorFactory {
    pub fn new(strategy: Strategy, threshold: f64) -> Result<Self, EvalError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(EvalError::InvalidThreshold(threshold));
        }
        Ok(Self {
            strategy,
            threshold,
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Trains on aligned `(dosage, label)` pairs by averaging the dosage of each label.
    pub fn build<L: AsRef<str>>(
        &self,
        dosages: &[f64],
        labels: &[L],
    ) -> Result<Predictor, EvalError> {
        if dosages.len() != labels.len() {
            return Err(EvalError::MismatchedTrainingData {
                dosages: dosages.len(),
                labels: labels.len(),
            });
        }
        if dosages.is_empty() {
            return Err(EvalError::EmptyTrainingSet);
        }

        let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for (dosage, label) in dosages.iter().zip(labels) {
            let entry = sums.entry(label.as_ref()).or_insert((0.0, 0));
            entry.0 += dosage;
            entry.1 += 1;
        }

        let centroids = sums
            .into_iter()
            .map(|(label, (sum, count))| (label.to_owned(), sum / count as f64))
            .collect();

        Ok(Predictor {
            strategy: self.strategy,
            threshold: self.threshold,
            centroids,
            memo: RefCell::new(AHashMap::new()),
        })
    }
}

/// A trained predictor. Predictions are memoised per dosage value for the
/// lifetime of the instance.
#[derive(Debug)]
pub struct Predictor {
    strategy: Strategy,
    threshold: f64,
    centroids: Vec<(String, f64)>,
    memo: RefCell<AHashMap<u64, Rc<Prediction>>>,
}

impl Predictor {
    /// `(label, mean dosage)` pairs sorted by label.
    pub fn centroids(&self) -> &[(String, f64)] {
        &self.centroids
    }

    pub fn predict(&self, dosage: f64) -> Rc<Prediction> {
        let key = dosage.to_bits();
        if let Some(hit) = self.memo.borrow().get(&key) {
            return Rc::clone(hit);
        }

        let prediction = Rc::new(match self.strategy {
            Strategy::NearestWithMargin => self.nearest_with_margin(dosage),
            Strategy::PairwiseVote => self.pairwise_vote(dosage),
        });
        self.memo.borrow_mut().insert(key, Rc::clone(&prediction));
        prediction
    }

    fn nearest_with_margin(&self, dosage: f64) -> Prediction {
        let mut distances: Vec<(&str, f64)> = self
            .centroids
            .iter()
            .map(|(label, centroid)| (label.as_str(), (dosage - centroid).abs()))
            .collect();
        // Stable, so equal distances keep label order.
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));

        match distances.as_slice() {
            [(only, _)] => Prediction::certain(only),
            [(closest, first), (_, second), ..] if second - first >= self.threshold => {
                Prediction::certain(closest)
            }
            _ => Prediction::default(),
        }
    }

    fn pairwise_vote(&self, dosage: f64) -> Prediction {
        if let [(only, _)] = self.centroids.as_slice() {
            return Prediction::certain(only);
        }

        let mut votes = vec![0usize; self.centroids.len()];
        let mut cast = 0usize;
        for (a, b) in (0..self.centroids.len()).tuple_combinations() {
            let difference =
                (dosage - self.centroids[a].1).abs() - (dosage - self.centroids[b].1).abs();
            if difference == 0.0 || difference.abs() < self.threshold {
                continue;
            }
            votes[if difference < 0.0 { a } else { b }] += 1;
            cast += 1;
        }

        let entries = votes
            .iter()
            .zip(&self.centroids)
            .filter(|(count, _)| **count > 0)
            .map(|(count, (label, _))| (label.clone(), *count as f64 / cast as f64))
            .collect();
        Prediction { entries }
    }
}
