//! Train/target partitioning of the labelled individuals.

use crate::types::EvalError;
use rand::Rng;
use rand::seq::SliceRandom;

/// Two disjoint index sets, each kept in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    train: Vec<usize>,
    target: Vec<usize>,
}

impl Partition {
    /// Trains on and predicts every index. Used as a smoke-test evaluation when only
    /// one repetition is requested.
    pub fn whole(indices: &[usize]) -> Result<Self, EvalError> {
        if indices.is_empty() {
            return Err(EvalError::EmptyTrainingSet);
        }
        let mut all = indices.to_vec();
        all.sort_unstable();
        Ok(Self {
            train: all.clone(),
            target: all,
        })
    }

    pub fn train(&self) -> &[usize] {
        &self.train
    }

    pub fn target(&self) -> &[usize] {
        &self.target
    }
}

pub fn check_ratio(ratio: f64) -> Result<(), EvalError> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(EvalError::InvalidRatio(ratio))
    }
}

/// Shuffles `indices` and puts the first `floor(len * ratio)` of them in the
/// target set and the rest in the training set.
pub fn split<R: Rng + ?Sized>(
    indices: &[usize],
    ratio: f64,
    rng: &mut R,
) -> Result<Partition, EvalError> {
    check_ratio(ratio)?;

    let mut shuffled = indices.to_vec();
    shuffled.shuffle(rng);

    let cut = ((shuffled.len() as f64 * ratio).floor() as usize).min(shuffled.len());
    let mut train = shuffled.split_off(cut);
    let mut target = shuffled;

    if target.is_empty() {
        return Err(EvalError::EmptyTargetSet);
    }
    if train.is_empty() {
        return Err(EvalError::EmptyTrainingSet);
    }

    train.sort_unstable();
    target.sort_unstable();
    Ok(Partition { train, target })
}
