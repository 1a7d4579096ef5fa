// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Types used by more than one evaluator live here; single-use types stay next to their code.

use crate::vcf::{Population, VcfError};
use log::warn;
use thiserror::Error;

/// Everything that can abort an evaluation run.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Stream(#[from] VcfError),
    #[error("{n} individuals have no population label: {0:?}", n = .0.len())]
    UnlabeledIndividuals(Vec<String>),
    #[error(
        "The training set is empty. Check the split ratio and the number of labelled individuals."
    )]
    EmptyTrainingSet,
    #[error(
        "The target set is empty. Check the split ratio and the number of labelled individuals."
    )]
    EmptyTargetSet,
    #[error("Training data is misaligned: {dosages} dosages but {labels} labels")]
    MismatchedTrainingData { dosages: usize, labels: usize },
    #[error("The split ratio must lie in [0, 1], got {0}")]
    InvalidRatio(f64),
    #[error("The number of repeats must be at least 1")]
    InvalidRepeats,
    #[error("The predictor threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f64),
    #[error("The final-call margin must be finite and non-negative, got {0}")]
    InvalidMargin(f64),
    #[error("Standard deviation is undefined for {samples} sample(s); at least two are required")]
    UndefinedStdev { samples: usize },
}

/// The individuals of a stream that carry a population label.
///
/// Evaluators partition positions `0..len()` of this list; `stream_index` maps a
/// position back to the genotype column of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledIndividuals {
    stream_indices: Vec<usize>,
    names: Vec<String>,
    labels: Vec<String>,
}

impl LabeledIndividuals {
    /// Resolves the label of every stream individual.
    ///
    /// In strict mode an unknown individual is an error; otherwise it is left out
    /// of the evaluation with a warning.
    pub fn resolve(
        individuals: &[String],
        population: &Population,
        strict: bool,
    ) -> Result<Self, EvalError> {
        let mut resolved = Self {
            stream_indices: Vec::with_capacity(individuals.len()),
            names: Vec::with_capacity(individuals.len()),
            labels: Vec::with_capacity(individuals.len()),
        };
        let mut unlabeled = Vec::new();

        for (index, individual) in individuals.iter().enumerate() {
            match population.group(individual) {
                Some(group) => {
                    resolved.stream_indices.push(index);
                    resolved.names.push(individual.clone());
                    resolved.labels.push(group.to_owned());
                }
                None => unlabeled.push(individual.clone()),
            }
        }

        if !unlabeled.is_empty() {
            if strict {
                return Err(EvalError::UnlabeledIndividuals(unlabeled));
            }
            warn!(
                "{} of {} individuals have no population label and are excluded",
                unlabeled.len(),
                individuals.len()
            );
        }

        Ok(resolved)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Positions `0..len()`, the domain evaluators partition.
    pub fn positions(&self) -> Vec<usize> {
        (0..self.len()).collect()
    }

    pub fn stream_index(&self, position: usize) -> usize {
        self.stream_indices[position]
    }

    pub fn name(&self, position: usize) -> &str {
        &self.names[position]
    }

    pub fn label(&self, position: usize) -> &str {
        &self.labels[position]
    }
}
