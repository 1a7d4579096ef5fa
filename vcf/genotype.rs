//! Genotype token decoding.
//!
//! A genotype token looks like `0|1`, `1/1`, `0` or `0|1:35:0.9`. Only the
//! part before the first `:` matters. It is split into alleles on `|` and
//! `/`, and the dosage is the fraction of those alleles that are not the
//! reference allele `0`. A missing call (`.`) is not `0` and therefore counts
//! as non-reference.

use ahash::AHashMap;

/// Separators between alleles of a single call (phased and unphased).
const ALLELE_SEPARATORS: [char; 2] = ['|', '/'];

/// Converts one raw genotype token into its alternative-allele dosage in `[0, 1]`.
pub fn dosage(token: &str) -> f64 {
    let call = token.split(':').next().unwrap_or(token);

    let mut called = 0usize;
    let mut non_reference = 0usize;
    for allele in call.split(ALLELE_SEPARATORS) {
        called += 1;
        if allele != "0" {
            non_reference += 1;
        }
    }

    // `split` always yields at least one piece, so `called` is never zero.
    non_reference as f64 / called as f64
}

/// Run-scoped memo table for [`dosage`].
///
/// Large cohorts repeat a handful of distinct tokens (`0|0`, `0|1`, ...) millions
/// of times, so the table stays tiny while saving the re-parse.
#[derive(Debug, Default)]
pub struct DosageCache {
    table: AHashMap<String, f64>,
}

impl DosageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dosage(&mut self, token: &str) -> f64 {
        if let Some(&value) = self.table.get(token) {
            return value;
        }
        let value = dosage(token);
        self.table.insert(token.to_owned(), value);
        value
    }

    /// Decodes every token of a record in order.
    pub fn dosages<'a, I>(&mut self, tokens: I) -> Vec<f64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        tokens.into_iter().map(|token| self.dosage(token)).collect()
    }

    /// Number of distinct tokens seen so far.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn diploid_calls_count_alternative_alleles() {
        assert_abs_diff_eq!(dosage("0|0"), 0.0);
        assert_abs_diff_eq!(dosage("0|1"), 0.5);
        assert_abs_diff_eq!(dosage("1|0"), 0.5);
        assert_abs_diff_eq!(dosage("1/1"), 1.0);
        assert_abs_diff_eq!(dosage("0/2"), 0.5);
    }

    #[test]
    fn haploid_and_polyploid_calls() {
        assert_abs_diff_eq!(dosage("0"), 0.0);
        assert_abs_diff_eq!(dosage("1"), 1.0);
        assert_abs_diff_eq!(dosage("0|1|1"), 2.0 / 3.0);
        assert_abs_diff_eq!(dosage("0|0/1/1"), 0.5);
    }

    #[test]
    fn format_suffix_is_ignored() {
        assert_abs_diff_eq!(dosage("0|1:35:0.9"), dosage("0|1"));
        assert_abs_diff_eq!(dosage("1/1:0,0,12"), 1.0);
        assert_abs_diff_eq!(dosage("0:99"), 0.0);
    }

    #[test]
    fn missing_alleles_count_as_non_reference() {
        assert_abs_diff_eq!(dosage(".|0"), 0.5);
        assert_abs_diff_eq!(dosage("./."), 1.0);
    }

    #[test]
    fn dosage_stays_in_unit_interval() {
        for token in ["0|0", "0|1", "1|1", "2|3", ".", "0/0/0/1", "10|0:5"] {
            let value = dosage(token);
            assert!((0.0..=1.0).contains(&value), "{token} gave {value}");
        }
    }

    #[test]
    fn cache_returns_the_same_values_and_dedupes_tokens() {
        let mut cache = DosageCache::new();
        let tokens = ["0|1", "0|1", "1|1", "0|1", "0|0"];
        let values = cache.dosages(tokens.iter().copied());

        assert_eq!(values, vec![0.5, 0.5, 1.0, 0.5, 0.0]);
        assert_eq!(cache.len(), 3);
        assert!(!cache.is_empty());
    }
}
