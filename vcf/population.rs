//! Individual-to-group registry, loaded from a two-column text file.

use crate::shared::files::open_text_source;
use ahash::AHashMap;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PopulationError {
    #[error("I/O error while reading the population file: {0}")]
    Io(#[from] io::Error),
    #[error("Line {line} ({content:?}) is invalid: needs 2 fields, found {found}")]
    InvalidLine {
        line: usize,
        content: String,
        found: usize,
    },
}

/// Every individual belongs to exactly one group.
#[derive(Debug, Clone, Default)]
pub struct Population {
    individual_to_group: AHashMap<String, String>,
    group_to_individuals: BTreeMap<String, Vec<String>>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `individual` as a member of `group`, moving it out of any
    /// group it belonged to before.
    pub fn add_individual(&mut self, individual: impl Into<String>, group: impl Into<String>) {
        let individual = individual.into();
        let group = group.into();

        if let Some(previous) = self
            .individual_to_group
            .insert(individual.clone(), group.clone())
        {
            if previous == group {
                return;
            }
            warn!("Individual {individual} was listed in {previous} and is reassigned to {group}");
            self.detach(&individual, &previous);
        }
        self.group_to_individuals
            .entry(group)
            .or_default()
            .push(individual);
    }

    pub fn remove_individual(&mut self, individual: &str) {
        if let Some(group) = self.individual_to_group.remove(individual) {
            self.detach(individual, &group);
        }
    }

    fn detach(&mut self, individual: &str, group: &str) {
        if let Some(members) = self.group_to_individuals.get_mut(group) {
            members.retain(|member| member != individual);
            if members.is_empty() {
                self.group_to_individuals.remove(group);
            }
        }
    }

    pub fn group(&self, individual: &str) -> Option<&str> {
        self.individual_to_group.get(individual).map(String::as_str)
    }

    pub fn has_individual(&self, individual: &str) -> bool {
        self.individual_to_group.contains_key(individual)
    }

    pub fn individuals(&self) -> impl Iterator<Item = &str> {
        self.individual_to_group.keys().map(String::as_str)
    }

    /// Group names in lexicographic order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.group_to_individuals.keys().map(String::as_str)
    }

    /// Members of `group` in the order they were added.
    pub fn members(&self, group: &str) -> Option<&[String]> {
        self.group_to_individuals.get(group).map(Vec::as_slice)
    }

    /// `(group, members)` pairs in lexicographic group order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.group_to_individuals
            .iter()
            .map(|(group, members)| (group.as_str(), members.as_slice()))
    }

    /// Looks up the group of each individual, `None` for unknown individuals.
    pub fn labels<'a, I>(&'a self, individuals: I) -> Vec<Option<&'a str>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        individuals
            .into_iter()
            .map(|individual| self.group(individual.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.individual_to_group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individual_to_group.is_empty()
    }

    /// Parses `individual group` lines. `#` starts a comment and blank lines are skipped.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, PopulationError> {
        let mut population = Self::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let content = match line.find('#') {
                Some(comment_start) => &line[..comment_start],
                None => line.as_str(),
            }
            .trim();

            if content.is_empty() {
                continue;
            }

            let fields: Vec<&str> = content.split_whitespace().collect();
            if fields.len() != 2 {
                return Err(PopulationError::InvalidLine {
                    line: index + 1,
                    content: content.to_owned(),
                    found: fields.len(),
                });
            }
            population.add_individual(fields[0], fields[1]);
        }

        debug!(
            "Loaded population: {} individuals in {} groups",
            population.len(),
            population.group_to_individuals.len()
        );
        Ok(population)
    }

    pub fn from_path(path: &Path) -> Result<Self, PopulationError> {
        Self::parse(open_text_source(Some(path))?)
    }
}
