//! Composable stream stages.
//!
//! A stage wraps an upstream [`RecordStream`] and is itself a `RecordStream`, so
//! stages chain by wrapping: `stream.pipe(a)?.pipe(b)?`. The metadata and
//! individual hooks run once when the stage is built; the record hook runs for
//! every record pulled through the stage.

use crate::vcf::stream::{RecordStream, VariantRecord, VcfError};
use ahash::AHashSet;
use log::{debug, warn};
use natord::compare;

/// What a stage does with one upstream record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordAction {
    /// Pass this (possibly transformed) record downstream.
    Keep(VariantRecord),
    /// Skip this record and pull the next one.
    Drop,
    /// End the stream now, regardless of what is left upstream.
    Stop,
}

/// The hooks a stage can override. Every default passes data through unchanged.
pub trait RecordFilter {
    fn filter_metadata(&mut self, metadata: Vec<(String, String)>) -> Vec<(String, String)> {
        metadata
    }

    /// Rewrites the individual list. Must agree with how `filter_record`
    /// rearranges genotype tokens.
    fn filter_individuals(&mut self, individuals: Vec<String>) -> Result<Vec<String>, VcfError> {
        Ok(individuals)
    }

    fn filter_record(&mut self, record: VariantRecord) -> RecordAction {
        RecordAction::Keep(record)
    }

    /// Checked before every upstream pull. Once true, the stage ends without
    /// reading anything more from upstream.
    fn is_complete(&self) -> bool {
        false
    }
}

/// An upstream stream seen through one filter.
#[derive(Debug)]
pub struct Filtered<S, F> {
    inner: S,
    filter: F,
    metadata: Vec<(String, String)>,
    individuals: Vec<String>,
    stopped: bool,
}

impl<S: RecordStream, F: RecordFilter> Filtered<S, F> {
    pub fn new(inner: S, mut filter: F) -> Result<Self, VcfError> {
        let metadata = filter.filter_metadata(inner.metadata().to_vec());
        let individuals = filter.filter_individuals(inner.individuals().to_vec())?;
        Ok(Self {
            inner,
            filter,
            metadata,
            individuals,
            stopped: false,
        })
    }

    pub fn as_filter(&self) -> &F {
        &self.filter
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: RecordStream, F: RecordFilter> Iterator for Filtered<S, F> {
    type Item = Result<VariantRecord, VcfError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }

        loop {
            if self.filter.is_complete() {
                debug!("Filter stage complete; not reading further upstream records");
                self.stopped = true;
                return None;
            }

            let record = match self.inner.next()? {
                Ok(record) => record,
                Err(err) => return Some(Err(err)),
            };

            match self.filter.filter_record(record) {
                RecordAction::Keep(record) => return Some(Ok(record)),
                RecordAction::Drop => continue,
                RecordAction::Stop => {
                    self.stopped = true;
                    return None;
                }
            }
        }
    }
}

impl<S: RecordStream, F: RecordFilter> RecordStream for Filtered<S, F> {
    fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }

    fn individuals(&self) -> &[String] {
        &self.individuals
    }
}

/// Restricts the stream to a named set of individuals.
///
/// Kept individuals stay in upstream order. Their upstream column indices are
/// computed once, when the stage is built, and every record is projected onto them.
#[derive(Debug, Clone)]
pub struct IndividualsFilter {
    requested: AHashSet<String>,
    indices: Vec<usize>,
    strict: bool,
}

impl IndividualsFilter {
    pub fn new<I, S>(individuals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requested: individuals.into_iter().map(Into::into).collect(),
            indices: Vec::new(),
            strict: false,
        }
    }

    /// In strict mode a requested individual missing upstream is an error.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Upstream indices of the kept individuals, in output order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl RecordFilter for IndividualsFilter {
    fn filter_individuals(&mut self, individuals: Vec<String>) -> Result<Vec<String>, VcfError> {
        self.indices.clear();
        let mut kept = Vec::with_capacity(self.requested.len());

        for (index, individual) in individuals.into_iter().enumerate() {
            if self.requested.contains(&individual) {
                self.indices.push(index);
                kept.push(individual);
            }
        }

        // Compare by name: a repeated header column must not hide a missing request.
        let found: AHashSet<&str> = kept.iter().map(String::as_str).collect();
        let mut missing: Vec<String> = self
            .requested
            .iter()
            .filter(|id| !found.contains(id.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            missing.sort_by(|a, b| compare(a, b));
            if self.strict {
                return Err(VcfError::MissingIndividuals(missing));
            }
            warn!(
                "{} requested individuals are not present in the VCF and will be ignored: {:?}",
                missing.len(),
                missing
            );
        }

        Ok(kept)
    }

    fn filter_record(&mut self, record: VariantRecord) -> RecordAction {
        RecordAction::Keep(record.select_genotypes(&self.indices))
    }
}

/// Restricts the stream to records whose `ID` is in a requested set.
///
/// The stage completes as soon as every requested identifier has been seen, so a
/// large source is not scanned past the last record of interest.
#[derive(Debug, Clone)]
pub struct IdentifierFilter {
    requested: AHashSet<String>,
    seen: AHashSet<String>,
}

impl IdentifierFilter {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requested: identifiers.into_iter().map(Into::into).collect(),
            seen: AHashSet::new(),
        }
    }

    /// Requested identifiers that have not matched a record yet.
    pub fn pending(&self) -> usize {
        self.requested.len() - self.seen.len()
    }
}

impl RecordFilter for IdentifierFilter {
    fn filter_record(&mut self, record: VariantRecord) -> RecordAction {
        if self.is_complete() {
            return RecordAction::Stop;
        }
        if !self.requested.contains(record.id()) {
            return RecordAction::Drop;
        }
        if !self.seen.contains(record.id()) {
            self.seen.insert(record.id().to_owned());
        }
        RecordAction::Keep(record)
    }

    fn is_complete(&self) -> bool {
        self.seen.len() == self.requested.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcf::stream::VcfStream;
    use std::io::Cursor;

    const SOURCE: &str = "\
##fileformat=VCFv4.1
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA1\tA2\tB1\tB2
1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|0\t0|1\t1|1\t1|0
1\t200\trs2\tC\tT\t.\tPASS\t.\tGT\t1|1\t0|0\t0|1\t0|0
1\t300\trs3\tG\tA\t.\tPASS\t.\tGT\t0|1\t1|1\t0|0\t1|1
1\t400\trs4\tT\tC\t.\tPASS\t.\tGT\t0|0\t0|0\t0|0\t0|0
";

    fn stream() -> VcfStream<Cursor<&'static [u8]>> {
        VcfStream::from_reader(Cursor::new(SOURCE.as_bytes())).unwrap()
    }

    fn ids<S: RecordStream>(stream: S) -> Vec<String> {
        stream.map(|record| record.unwrap().id().to_string()).collect()
    }

    #[test]
    fn default_hooks_pass_everything_through() {
        struct Identity;
        impl RecordFilter for Identity {}

        let filtered = stream().pipe(Identity).unwrap();
        assert_eq!(filtered.individuals(), &["A1", "A2", "B1", "B2"]);
        assert_eq!(filtered.metadata().len(), 1);
        assert_eq!(ids(filtered), vec!["rs1", "rs2", "rs3", "rs4"]);
    }

    #[test]
    fn individuals_filter_projects_genotypes_in_upstream_order() {
        let filtered = stream()
            .pipe(IndividualsFilter::new(["B2", "A1"]))
            .unwrap();
        assert_eq!(filtered.individuals(), &["A1", "B2"]);
        assert_eq!(filtered.as_filter().indices(), &[0, 3]);

        let genotypes: Vec<Vec<String>> = filtered
            .map(|r| r.unwrap().genotypes().map(str::to_string).collect())
            .collect();
        assert_eq!(genotypes[0], vec!["0|0", "1|0"]);
        assert_eq!(genotypes[1], vec!["1|1", "0|0"]);
        assert_eq!(genotypes.len(), 4);
    }

    #[test]
    fn strict_individuals_filter_reports_missing_ids() {
        let err = stream()
            .pipe(IndividualsFilter::new(["A1", "Z9", "C10", "C2"]).strict(true))
            .unwrap_err();
        match err {
            VcfError::MissingIndividuals(missing) => {
                assert_eq!(missing, vec!["C2", "C10", "Z9"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn strict_filter_sees_through_repeated_header_columns() {
        let source = "\
##fileformat=VCFv4.1
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA1\tA1
1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|0\t0|1
";
        let err = VcfStream::from_reader(Cursor::new(source.as_bytes()))
            .unwrap()
            .pipe(IndividualsFilter::new(["A1", "Z9"]).strict(true))
            .unwrap_err();
        match err {
            VcfError::MissingIndividuals(missing) => assert_eq!(missing, vec!["Z9"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lenient_individuals_filter_ignores_missing_ids() {
        let filtered = stream()
            .pipe(IndividualsFilter::new(["A2", "Z9"]))
            .unwrap();
        assert_eq!(filtered.individuals(), &["A2"]);
    }

    #[test]
    fn identifier_filter_drops_unrequested_records() {
        let filtered = stream()
            .pipe(IdentifierFilter::new(["rs3", "rs1", "rs99"]))
            .unwrap();
        assert_eq!(ids(filtered), vec!["rs1", "rs3"]);
    }

    #[test]
    fn identifier_filter_stops_reading_after_the_last_match() {
        let mut cursor = Cursor::new(SOURCE.as_bytes());
        {
            let source = VcfStream::from_reader(&mut cursor).unwrap();
            let mut filtered = source.pipe(IdentifierFilter::new(["rs2"])).unwrap();
            assert_eq!(filtered.next().unwrap().unwrap().id(), "rs2");
            assert!(filtered.next().is_none());
            assert_eq!(filtered.as_filter().pending(), 0);
        }
        let consumed = cursor.position() as usize;
        let end_of_rs2 = SOURCE.find("rs3").unwrap() - "1\t300\t".len();
        assert_eq!(consumed, end_of_rs2);
    }

    #[test]
    fn repeated_identifiers_pass_until_every_id_was_seen() {
        let source = "\
##fileformat=VCFv4.1
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO
1\t100\trs1\tA\tG\t.\tPASS\t.
1\t150\trs1\tA\tC\t.\tPASS\t.
1\t200\trs2\tC\tT\t.\tPASS\t.
1\t300\trs1\tG\tA\t.\tPASS\t.
";
        let filtered = VcfStream::from_reader(Cursor::new(source.as_bytes()))
            .unwrap()
            .pipe(IdentifierFilter::new(["rs1", "rs2"]))
            .unwrap();
        // Completion tracks distinct ids, so a repeat before the last new id is kept
        // and a repeat after it is never read.
        assert_eq!(ids(filtered), vec!["rs1", "rs1", "rs2"]);
    }

    #[test]
    fn empty_identifier_request_yields_nothing() {
        let filtered = stream()
            .pipe(IdentifierFilter::new(Vec::<String>::new()))
            .unwrap();
        assert!(ids(filtered).is_empty());
    }

    #[test]
    fn stop_action_ends_the_stream_for_good() {
        struct StopAtSecond(usize);
        impl RecordFilter for StopAtSecond {
            fn filter_record(&mut self, record: VariantRecord) -> RecordAction {
                self.0 += 1;
                if self.0 == 2 {
                    RecordAction::Stop
                } else {
                    RecordAction::Keep(record)
                }
            }
        }

        let mut filtered = stream().pipe(StopAtSecond(0)).unwrap();
        assert_eq!(filtered.next().unwrap().unwrap().id(), "rs1");
        assert!(filtered.next().is_none());
        assert!(filtered.next().is_none());
    }

    #[test]
    fn stages_compose_in_order() {
        struct RenameMetadata;
        impl RecordFilter for RenameMetadata {
            fn filter_metadata(&mut self, metadata: Vec<(String, String)>) -> Vec<(String, String)> {
                metadata
                    .into_iter()
                    .map(|(key, value)| (key.to_uppercase(), value))
                    .collect()
            }
        }

        let filtered = stream()
            .pipe(IndividualsFilter::new(["A2", "B1"]))
            .unwrap()
            .pipe(IdentifierFilter::new(["rs3", "rs2"]))
            .unwrap()
            .pipe(RenameMetadata)
            .unwrap();

        assert_eq!(filtered.individuals(), &["A2", "B1"]);
        assert_eq!(filtered.metadata()[0].0, "FILEFORMAT");
        let records: Vec<VariantRecord> = filtered.collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].genotypes().collect::<Vec<_>>(), vec!["0|0", "0|1"]);
        assert_eq!(records[1].genotypes().collect::<Vec<_>>(), vec!["1|1", "0|0"]);
    }

    #[test]
    fn boxed_streams_compose_at_runtime() {
        let mut boxed: Box<dyn RecordStream> = Box::new(stream());
        boxed = Box::new(boxed.pipe(IdentifierFilter::new(["rs4"])).unwrap());
        assert_eq!(boxed.individuals().len(), 4);
        assert_eq!(ids(boxed), vec!["rs4"]);
    }
}
