// ========================================================================================
//                   Group calls from accumulated confidences (prediction mode)
// ========================================================================================

use crate::partition::split;
use crate::predictor::PredictorFactory;
use crate::types::{EvalError, LabeledIndividuals};
use crate::vcf::{DosageCache, Population, RecordStream};
use itertools::Itertools;
use log::{debug, info};
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;

/// Printed in place of a group when an individual gets no call.
pub const NO_CALL: &str = "---";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionOptions {
    /// Fraction of labelled individuals held out as targets.
    pub ratio: f64,
    /// Required lead of the best group over the runner-up. Values strictly between
    /// 0 and 1 are relative to the best total.
    pub min_margin: f64,
    pub strict_labels: bool,
}

impl Default for PredictionOptions {
    fn default() -> Self {
        Self {
            ratio: 0.1,
            min_margin: 0.0,
            strict_labels: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndividualCall {
    pub individual: String,
    pub true_label: String,
    pub call: Option<String>,
}

impl fmt::Display for IndividualCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}",
            self.individual,
            self.true_label,
            self.call.as_deref().unwrap_or(NO_CALL)
        )
    }
}

/// Picks the group with the highest accumulated confidence, or nothing when its
/// lead over the runner-up is below `min_margin`.
pub fn final_call(totals: &BTreeMap<String, f64>, min_margin: f64) -> Option<String> {
    // Stable sort over label order, so equal totals resolve lexicographically.
    let ranked: Vec<(&String, f64)> = totals
        .iter()
        .map(|(label, total)| (label, *total))
        .sorted_by(|a, b| b.1.total_cmp(&a.1))
        .collect();

    let (best, top) = *ranked.first()?;
    let second = ranked.get(1).map_or(0.0, |(_, total)| *total);

    let mut margin = top - second;
    if min_margin > 0.0 && min_margin < 1.0 {
        if top <= 0.0 {
            return None;
        }
        margin /= top;
    }
    (margin >= min_margin).then(|| best.clone())
}

/// Trains one predictor per record on a single random split and calls a group for
/// every target individual from its confidences summed over all records.
pub fn predict_groups<S, R>(
    stream: S,
    population: &Population,
    factory: PredictorFactory,
    options: &PredictionOptions,
    rng: &mut R,
) -> Result<Vec<IndividualCall>, EvalError>
where
    S: RecordStream,
    R: Rng + ?Sized,
{
    if !options.min_margin.is_finite() || options.min_margin < 0.0 {
        return Err(EvalError::InvalidMargin(options.min_margin));
    }

    let labeled =
        LabeledIndividuals::resolve(stream.individuals(), population, options.strict_labels)?;
    let partition = split(&labeled.positions(), options.ratio, rng)?;

    let train_columns: Vec<usize> = partition
        .train()
        .iter()
        .map(|&p| labeled.stream_index(p))
        .collect();
    let train_labels: Vec<&str> = partition.train().iter().map(|&p| labeled.label(p)).collect();
    let target_columns: Vec<usize> = partition
        .target()
        .iter()
        .map(|&p| labeled.stream_index(p))
        .collect();

    info!(
        "Prediction run: {} training and {} target individuals, {:?} strategy",
        train_columns.len(),
        target_columns.len(),
        factory.strategy()
    );

    let mut totals: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new(); target_columns.len()];
    let mut cache = DosageCache::new();
    let mut markers = 0usize;

    for record in stream {
        let record = record?;
        let dosages = cache.dosages(record.genotypes());
        let train: Vec<f64> = train_columns.iter().map(|&c| dosages[c]).collect();
        let predictor = factory.build(&train, &train_labels)?;

        for (accumulator, &column) in totals.iter_mut().zip(&target_columns) {
            for (label, confidence) in predictor.predict(dosages[column]).iter() {
                *accumulator.entry(label.to_owned()).or_insert(0.0) += confidence;
            }
        }
        markers += 1;
    }
    debug!("Accumulated confidences over {markers} markers");

    Ok(partition
        .target()
        .iter()
        .zip(&totals)
        .map(|(&p, accumulated)| IndividualCall {
            individual: labeled.name(p).to_owned(),
            true_label: labeled.label(p).to_owned(),
            call: final_call(accumulated, options.min_margin),
        })
        .collect())
}
