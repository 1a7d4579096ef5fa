// ========================================================================================
//
//                           Streaming VCF record reader
//
// ========================================================================================
//
// The reader consumes a line-oriented VCF text source exactly once. The header block
// (metadata lines and the column header) is parsed eagerly when the stream is built, so
// the metadata and the individual list are known before the first record is pulled.
// Records are then produced lazily, one source line per pull.

use crate::vcf::filter::{Filtered, RecordFilter};
use log::info;
use std::io::{self, BufRead};
use thiserror::Error;

/// Positions of the fixed columns of a VCF data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Chromosome = 0,
    Position = 1,
    Identifier = 2,
    Reference = 3,
    Alternatives = 4,
    Quality = 5,
    Filter = 6,
    Info = 7,
    Format = 8,
}

/// Number of site columns in a file without genotype data.
const SITE_COLUMNS: usize = Column::Format as usize;
/// Number of leading info columns when a `FORMAT` column is present.
const GENOTYPE_COLUMNS: usize = Column::Format as usize + 1;
const FORMAT_MARKER: &str = "FORMAT";

#[derive(Error, Debug)]
pub enum VcfError {
    #[error("I/O error while reading the VCF source: {0}")]
    Io(#[from] io::Error),
    #[error("VCF file is empty")]
    Empty,
    #[error("VCF file contains only metadata")]
    OnlyMetadata,
    #[error("VCF file does not contain metadata")]
    MissingMetadata,
    #[error("VCF file does not contain a header line")]
    MissingHeader,
    #[error("Malformed VCF line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("Cannot find the following individuals in this file: {0:?}")]
    MissingIndividuals(Vec<String>),
}

impl VcfError {
    /// True for every violation of the header or line layout.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::Empty
                | Self::OnlyMetadata
                | Self::MissingMetadata
                | Self::MissingHeader
                | Self::Malformed { .. }
        )
    }
}

/// One variant line: the fixed info fields plus one raw genotype token per individual.
///
/// Genotype tokens are index-aligned with the individual list of the stream that
/// produced the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRecord {
    info: [String; GENOTYPE_COLUMNS],
    genotypes: Vec<String>,
}

impl VariantRecord {
    pub fn new(info: [String; GENOTYPE_COLUMNS], genotypes: Vec<String>) -> Self {
        Self { info, genotypes }
    }

    fn field(&self, column: Column) -> &str {
        &self.info[column as usize]
    }

    pub fn chromosome(&self) -> &str {
        self.field(Column::Chromosome)
    }

    pub fn position(&self) -> &str {
        self.field(Column::Position)
    }

    /// The `ID` column, used as the external key of the record.
    pub fn id(&self) -> &str {
        self.field(Column::Identifier)
    }

    pub fn reference(&self) -> &str {
        self.field(Column::Reference)
    }

    pub fn alternatives(&self) -> Vec<&str> {
        self.field(Column::Alternatives).split(',').collect()
    }

    pub fn quality(&self) -> &str {
        self.field(Column::Quality)
    }

    pub fn filter(&self) -> &str {
        self.field(Column::Filter)
    }

    pub fn info(&self) -> &str {
        self.field(Column::Info)
    }

    /// The `FORMAT` column, or an empty string for files without genotype columns.
    pub fn format(&self) -> &str {
        self.field(Column::Format)
    }

    pub fn genotype(&self, index: usize) -> Option<&str> {
        self.genotypes.get(index).map(String::as_str)
    }

    pub fn genotypes(&self) -> impl ExactSizeIterator<Item = &str> {
        self.genotypes.iter().map(String::as_str)
    }

    pub fn genotype_count(&self) -> usize {
        self.genotypes.len()
    }

    /// Keeps only the genotype tokens at `indices`, in the order given.
    ///
    /// # Panics
    /// Panics if an index is out of range for this record.
    pub fn select_genotypes(self, indices: &[usize]) -> Self {
        let genotypes = indices
            .iter()
            .map(|&index| self.genotypes[index].clone())
            .collect();
        Self {
            info: self.info,
            genotypes,
        }
    }
}

/// A forward-only sequence of records together with the stream-level header data.
pub trait RecordStream: Iterator<Item = Result<VariantRecord, VcfError>> {
    /// The `##key=value` pairs in file order.
    fn metadata(&self) -> &[(String, String)];

    /// The individual identifiers, in genotype-column order.
    fn individuals(&self) -> &[String];

    /// Wraps this stream in a filter stage.
    fn pipe<F>(self, filter: F) -> Result<Filtered<Self, F>, VcfError>
    where
        Self: Sized,
        F: RecordFilter,
    {
        Filtered::new(self, filter)
    }
}

impl<S: RecordStream + ?Sized> RecordStream for Box<S> {
    fn metadata(&self) -> &[(String, String)] {
        (**self).metadata()
    }

    fn individuals(&self) -> &[String] {
        (**self).individuals()
    }
}

/// The source stage: records parsed straight from VCF text.
#[derive(Debug)]
pub struct VcfStream<R> {
    reader: R,
    metadata: Vec<(String, String)>,
    individuals: Vec<String>,
    genotype_mode: bool,
    line_number: usize,
    buffer: String,
    done: bool,
}

impl<R: BufRead> VcfStream<R> {
    /// Reads the metadata block and the column header from `reader`.
    ///
    /// On success the reader is positioned at the first data line.
    pub fn from_reader(mut reader: R) -> Result<Self, VcfError> {
        let mut metadata = Vec::new();
        let mut line = String::new();
        let mut line_number = 0usize;

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(if line_number == 0 {
                    VcfError::Empty
                } else {
                    VcfError::OnlyMetadata
                });
            }
            line_number += 1;
            let text = trim_line_end(&line);

            if let Some(pair) = text.strip_prefix("##") {
                let (key, value) = pair.split_once('=').ok_or_else(|| VcfError::Malformed {
                    line: line_number,
                    message: format!("metadata line {text:?} has no '=' separator"),
                })?;
                metadata.push((key.to_owned(), value.to_owned()));
                continue;
            }

            if !text.starts_with('#') {
                return Err(VcfError::MissingHeader);
            }
            if metadata.is_empty() {
                return Err(VcfError::MissingMetadata);
            }

            let columns: Vec<&str> = text.split_whitespace().collect();
            if columns.len() < SITE_COLUMNS {
                return Err(VcfError::Malformed {
                    line: line_number,
                    message: format!(
                        "header has {} columns, expected at least {SITE_COLUMNS}",
                        columns.len()
                    ),
                });
            }

            let genotype_mode = columns.contains(&FORMAT_MARKER);
            let first_individual = if genotype_mode {
                GENOTYPE_COLUMNS
            } else {
                SITE_COLUMNS
            };
            let individuals: Vec<String> = columns
                .iter()
                .skip(first_individual)
                .map(|s| (*s).to_owned())
                .collect();

            info!(
                "Parsed VCF header: {} metadata lines, {} individuals, FORMAT column {}",
                metadata.len(),
                individuals.len(),
                if genotype_mode { "present" } else { "absent" }
            );

            return Ok(Self {
                reader,
                metadata,
                individuals,
                genotype_mode,
                line_number,
                buffer: String::new(),
                done: false,
            });
        }
    }

    /// Whether the header carried a `FORMAT` column.
    pub fn has_format_column(&self) -> bool {
        self.genotype_mode
    }
}

impl<R: BufRead> Iterator for VcfStream<R> {
    type Item = Result<VariantRecord, VcfError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buffer.clear();
            match self.reader.read_line(&mut self.buffer) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            }
            self.line_number += 1;

            let text = trim_line_end(&self.buffer);
            if text.trim().is_empty() {
                continue;
            }

            let parsed = parse_record(
                text,
                self.genotype_mode,
                self.individuals.len(),
                self.line_number,
            );
            if parsed.is_err() {
                self.done = true;
            }
            return Some(parsed);
        }
    }
}

impl<R: BufRead> RecordStream for VcfStream<R> {
    fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }

    fn individuals(&self) -> &[String] {
        &self.individuals
    }
}

fn trim_line_end(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

fn parse_record(
    line: &str,
    genotype_mode: bool,
    individuals: usize,
    line_number: usize,
) -> Result<VariantRecord, VcfError> {
    let info_columns = if genotype_mode {
        GENOTYPE_COLUMNS
    } else {
        SITE_COLUMNS
    };

    let mut tokens = line.split_whitespace();
    // Without a FORMAT column the last slot keeps its empty placeholder.
    let mut info: [String; GENOTYPE_COLUMNS] = Default::default();
    for (index, slot) in info.iter_mut().take(info_columns).enumerate() {
        let token = tokens.next().ok_or_else(|| VcfError::Malformed {
            line: line_number,
            message: format!("expected {info_columns} info columns, found {index}"),
        })?;
        *slot = token.to_owned();
    }

    let genotypes: Vec<String> = tokens.map(str::to_owned).collect();
    if genotypes.len() != individuals {
        return Err(VcfError::Malformed {
            line: line_number,
            message: format!(
                "found {} genotype columns for {individuals} individuals",
                genotypes.len()
            ),
        });
    }

    Ok(VariantRecord { info, genotypes })
}
