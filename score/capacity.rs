// ========================================================================================
//                      Per-marker predictive capacity (capacity mode)
// ========================================================================================

use crate::partition::{Partition, check_ratio, split};
use crate::predictor::PredictorFactory;
use crate::stats::{mean, sample_stdev};
use crate::types::{EvalError, LabeledIndividuals};
use crate::vcf::{DosageCache, Population, RecordStream, VariantRecord};
use log::{debug, info};
use rand::Rng;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityOptions {
    /// Independent train/target splits per marker. One means "train and test on everyone".
    pub repeats: usize,
    /// Fraction of labelled individuals held out as targets in each split.
    pub ratio: f64,
    pub strict_labels: bool,
}

impl Default for CapacityOptions {
    fn default() -> Self {
        Self {
            repeats: 20,
            ratio: 0.1,
            strict_labels: false,
        }
    }
}

/// Capacity of one marker: the mean accuracy over all repeats and, for more
/// than one repeat, its sample standard deviation.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityRecord {
    pub identifier: String,
    pub mean: f64,
    pub stdev: Option<f64>,
}

impl fmt::Display for CapacityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{:.5}", self.identifier, self.mean)?;
        if let Some(stdev) = self.stdev {
            write!(f, "\t{stdev:.5}")?;
        }
        Ok(())
    }
}

/// A partition resolved to genotype columns and labels once, reused for every marker.
#[derive(Debug)]
struct Fold {
    train_columns: Vec<usize>,
    train_labels: Vec<String>,
    targets: Vec<(usize, String)>,
}

impl Fold {
    fn resolve(partition: &Partition, labeled: &LabeledIndividuals) -> Self {
        Self {
            train_columns: partition
                .train()
                .iter()
                .map(|&p| labeled.stream_index(p))
                .collect(),
            train_labels: partition
                .train()
                .iter()
                .map(|&p| labeled.label(p).to_owned())
                .collect(),
            targets: partition
                .target()
                .iter()
                .map(|&p| (labeled.stream_index(p), labeled.label(p).to_owned()))
                .collect(),
        }
    }
}

/// Lazily scores every record of `stream`, one [`CapacityRecord`] per pull.
///
/// Iteration ends after the first error.
pub struct CapacityScores<S> {
    stream: S,
    factory: PredictorFactory,
    folds: Vec<Fold>,
    cache: DosageCache,
    accuracies: Vec<f64>,
    scored: usize,
    failed: bool,
}

/// Prepares a capacity run: resolves labels and draws every partition up front.
pub fn compute_capacity<S, R>(
    stream: S,
    population: &Population,
    factory: PredictorFactory,
    options: &CapacityOptions,
    rng: &mut R,
) -> Result<CapacityScores<S>, EvalError>
where
    S: RecordStream,
    R: Rng + ?Sized,
{
    if options.repeats == 0 {
        return Err(EvalError::InvalidRepeats);
    }
    check_ratio(options.ratio)?;

    let labeled =
        LabeledIndividuals::resolve(stream.individuals(), population, options.strict_labels)?;
    let positions = labeled.positions();

    let partitions = if options.repeats == 1 {
        vec![Partition::whole(&positions)?]
    } else {
        (0..options.repeats)
            .map(|_| split(&positions, options.ratio, rng))
            .collect::<Result<Vec<_>, _>>()?
    };

    info!(
        "Capacity run: {} labelled individuals, {} repeat(s), {:?} strategy",
        labeled.len(),
        options.repeats,
        factory.strategy()
    );

    Ok(CapacityScores {
        stream,
        factory,
        folds: partitions
            .iter()
            .map(|partition| Fold::resolve(partition, &labeled))
            .collect(),
        cache: DosageCache::new(),
        accuracies: Vec::with_capacity(options.repeats),
        scored: 0,
        failed: false,
    })
}

impl<S: RecordStream> CapacityScores<S> {
    fn score(&mut self, record: &VariantRecord) -> Result<CapacityRecord, EvalError> {
        let dosages = self.cache.dosages(record.genotypes());

        self.accuracies.clear();
        for fold in &self.folds {
            let train: Vec<f64> = fold.train_columns.iter().map(|&c| dosages[c]).collect();
            let predictor = self.factory.build(&train, &fold.train_labels)?;

            let hits: f64 = fold
                .targets
                .iter()
                .map(|(column, label)| predictor.predict(dosages[*column]).confidence(label))
                .sum();
            self.accuracies.push(hits / fold.targets.len() as f64);
        }

        // Setup rejects zero repeats, so there is at least one accuracy.
        let mean = mean(&self.accuracies).unwrap_or_default();
        let stdev = if self.accuracies.len() > 1 {
            Some(sample_stdev(&self.accuracies)?)
        } else {
            None
        };

        self.scored += 1;
        debug!("Scored marker {} ({}): {mean:.5}", self.scored, record.id());
        Ok(CapacityRecord {
            identifier: record.id().to_owned(),
            mean,
            stdev,
        })
    }
}

impl<S: RecordStream> Iterator for CapacityScores<S> {
    type Item = Result<CapacityRecord, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let outcome = match self.stream.next()? {
            Ok(record) => self.score(&record),
            Err(e) => Err(e.into()),
        };
        self.failed = outcome.is_err();
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::Strategy;
    use crate::vcf::VcfStream;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io::Cursor;

    const SOURCE: &str = "\
##fileformat=VCFv4.2
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA1\tA2\tA3\tA4\tB1\tB2\tB3\tB4
1\t100\trs_perfect\tA\tG\t.\tPASS\t.\tGT\t0|0\t0|0\t0|0\t0|0\t1|1\t1|1\t1|1\t1|1
1\t200\trs_flat\tC\tT\t.\tPASS\t.\tGT\t0|1\t0|1\t0|1\t0|1\t0|1\t0|1\t0|1\t0|1
";

    fn population() -> Population {
        let mut population = Population::new();
        for id in ["A1", "A2", "A3", "A4"] {
            population.add_individual(id, "A");
        }
        for id in ["B1", "B2", "B3", "B4"] {
            population.add_individual(id, "B");
        }
        population
    }

    fn factory() -> PredictorFactory {
        PredictorFactory::new(Strategy::NearestWithMargin, 0.1).unwrap()
    }

    fn run(options: CapacityOptions, population: &Population) -> Vec<CapacityRecord> {
        let stream = VcfStream::from_reader(Cursor::new(SOURCE)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        compute_capacity(stream, population, factory(), &options, &mut rng)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn single_repeat_trains_and_tests_on_everyone() {
        let records = run(
            CapacityOptions {
                repeats: 1,
                ..CapacityOptions::default()
            },
            &population(),
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, "rs_perfect");
        assert_relative_eq!(records[0].mean, 1.0);
        assert_eq!(records[0].stdev, None);
        // Both centroids sit at 0.5, so no individual gets a call.
        assert_relative_eq!(records[1].mean, 0.0);
        assert_eq!(records[1].to_string(), "rs_flat\t0.00000");
    }

    #[test]
    fn repeated_splits_report_a_spread() {
        let records = run(
            CapacityOptions {
                repeats: 5,
                ratio: 0.25,
                strict_labels: true,
            },
            &population(),
        );

        assert_relative_eq!(records[0].mean, 1.0);
        assert_eq!(records[0].stdev, Some(0.0));
        assert_eq!(records[0].to_string(), "rs_perfect\t1.00000\t0.00000");
        assert_relative_eq!(records[1].mean, 0.0);
    }

    #[test]
    fn unlabelled_individuals_are_left_out_unless_strict() {
        let mut partial = population();
        partial.remove_individual("B4");

        let records = run(
            CapacityOptions {
                repeats: 1,
                ..CapacityOptions::default()
            },
            &partial,
        );
        assert_relative_eq!(records[0].mean, 1.0);

        let stream = VcfStream::from_reader(Cursor::new(SOURCE)).unwrap();
        let strict = CapacityOptions {
            repeats: 1,
            ratio: 0.1,
            strict_labels: true,
        };
        let result = compute_capacity(
            stream,
            &partial,
            factory(),
            &strict,
            &mut StdRng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(EvalError::UnlabeledIndividuals(_))));
    }

    #[test]
    fn setup_rejects_bad_options() {
        let stream = VcfStream::from_reader(Cursor::new(SOURCE)).unwrap();
        let zero = CapacityOptions {
            repeats: 0,
            ..CapacityOptions::default()
        };
        assert!(matches!(
            compute_capacity(
                stream,
                &population(),
                factory(),
                &zero,
                &mut StdRng::seed_from_u64(0)
            ),
            Err(EvalError::InvalidRepeats)
        ));

        // 8 individuals * 0.1 rounds down to an empty target set.
        let stream = VcfStream::from_reader(Cursor::new(SOURCE)).unwrap();
        assert!(matches!(
            compute_capacity(
                stream,
                &population(),
                factory(),
                &CapacityOptions::default(),
                &mut StdRng::seed_from_u64(0)
            ),
            Err(EvalError::EmptyTargetSet)
        ));
    }

    #[test]
    fn a_malformed_record_ends_the_run() {
        let broken = format!("{SOURCE}1\t300\trs_short\tA\tG\n");
        let stream = VcfStream::from_reader(Cursor::new(broken)).unwrap();
        let options = CapacityOptions {
            repeats: 1,
            ..CapacityOptions::default()
        };
        let mut scores = compute_capacity(
            stream,
            &population(),
            factory(),
            &options,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();

        assert!(scores.next().unwrap().is_ok());
        assert!(scores.next().unwrap().is_ok());
        assert!(matches!(
            scores.next(),
            Some(Err(EvalError::Stream(_)))
        ));
        assert!(scores.next().is_none());
    }
}
