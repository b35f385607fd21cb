//! Query normalization: per-job deduplication, cardinality, and the global id table

use crate::error::SearchResult;
use crate::query::reader::QueryRecord;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;

/// Header number given to the first distinct sequence of every job in `query.fas`
pub const FIRST_QUERY_HEADER: usize = 101;

/// A job after deduplication.
///
/// `sequences` keeps first-seen order and `cardinality[i]` counts how often
/// `sequences[i]` occurred in the raw chain list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub sequences: Vec<String>,
    pub cardinality: Vec<usize>,
}

impl Job {
    pub fn from_raw<S: AsRef<str>>(name: impl Into<String>, raw_sequences: &[S]) -> Self {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for seq in raw_sequences {
            *counts.entry(seq.as_ref()).or_insert(0) += 1;
        }

        let (sequences, cardinality) = counts
            .into_iter()
            .map(|(seq, count)| (seq.to_string(), count))
            .unzip();

        Self {
            name: name.into(),
            sequences,
            cardinality,
        }
    }

    /// More than one distinct chain, so the job takes part in pairing
    pub fn is_complex(&self) -> bool {
        self.sequences.len() > 1
    }
}

/// Lookup entry for one global sequence id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEntry {
    pub id: usize,
    pub job_name: String,
    pub file_group: usize,
}

/// Dense, zero-based map from global sequence id to its job.
///
/// Ids run over all jobs in order, then over each job's distinct sequences.
/// `file_group` is the job's position and is shared by all of its sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryIndex {
    entries: Vec<QueryEntry>,
    groups: Vec<Range<usize>>,
}

impl QueryIndex {
    pub fn build(jobs: &[Job]) -> Self {
        let mut entries = Vec::new();
        let mut groups = Vec::with_capacity(jobs.len());

        for (file_group, job) in jobs.iter().enumerate() {
            let start = entries.len();
            for _ in &job.sequences {
                entries.push(QueryEntry {
                    id: entries.len(),
                    job_name: job.name.clone(),
                    file_group,
                });
            }
            groups.push(start..entries.len());
        }

        Self { entries, groups }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryEntry> {
        self.entries.iter()
    }

    /// Global ids belonging to a job
    pub fn ids_for_group(&self, file_group: usize) -> Range<usize> {
        self.groups.get(file_group).cloned().unwrap_or(0..0)
    }

    /// Write the tab-separated `id<TAB>job<TAB>group` table
    pub fn write_lookup<P: AsRef<Path>>(&self, path: P) -> SearchResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for entry in &self.entries {
            writeln!(writer, "{}\t{}\t{}", entry.id, entry.job_name, entry.file_group)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Normalizer output: deduplicated jobs plus their id table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQueries {
    pub jobs: Vec<Job>,
    pub index: QueryIndex,
}

impl NormalizedQueries {
    pub fn is_complex(&self) -> bool {
        self.jobs.iter().any(Job::is_complex)
    }
}

pub fn normalize(records: &[QueryRecord]) -> NormalizedQueries {
    let jobs: Vec<Job> = records
        .iter()
        .map(|r| Job::from_raw(r.job_name.clone(), &r.sequences))
        .collect();
    let index = QueryIndex::build(&jobs);
    NormalizedQueries { jobs, index }
}

/// Write the canonical query file.
///
/// Header numbers restart at [`FIRST_QUERY_HEADER`] for every job; they are
/// opaque labels and the engine keys records by position, not by header.
pub fn write_query_fasta<P: AsRef<Path>>(jobs: &[Job], path: P) -> SearchResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for job in jobs {
        for (j, seq) in job.sequences.iter().enumerate() {
            writeln!(writer, ">{}\n{}", FIRST_QUERY_HEADER + j, seq)?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn record(name: &str, seqs: &[&str]) -> QueryRecord {
        QueryRecord::new(name, seqs.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_duplicate_chains_collapse_in_first_seen_order() {
        let job = Job::from_raw("X", &["AAA", "BBB", "AAA"]);
        assert_eq!(job.sequences, vec!["AAA", "BBB"]);
        assert_eq!(job.cardinality, vec![2, 1]);
        assert!(job.is_complex());
        assert_eq!(job.cardinality.iter().sum::<usize>(), 3);
    }

    #[test]
    fn test_order_is_not_sorted() {
        let job = Job::from_raw("Y", &["ZZZ", "AAA", "ZZZ", "MMM"]);
        assert_eq!(job.sequences, vec!["ZZZ", "AAA", "MMM"]);
        assert_eq!(job.cardinality, vec![2, 1, 1]);
    }

    #[test]
    fn test_homodimer_is_not_complex() {
        let job = Job::from_raw("homo", &["AAA", "AAA"]);
        assert_eq!(job.sequences, vec!["AAA"]);
        assert_eq!(job.cardinality, vec![2]);
        assert!(!job.is_complex());
    }

    #[test]
    fn test_index_assigns_dense_ids_and_groups() {
        let normalized = normalize(&[
            record("first", &["AAA", "BBB", "AAA"]),
            record("second", &["CCC"]),
            record("third", &["DDD", "EEE"]),
        ]);

        let index = &normalized.index;
        assert_eq!(index.len(), 5);
        let rows: Vec<(usize, &str, usize)> = index
            .iter()
            .map(|e| (e.id, e.job_name.as_str(), e.file_group))
            .collect();
        assert_eq!(
            rows,
            vec![
                (0, "first", 0),
                (1, "first", 0),
                (2, "second", 1),
                (3, "third", 2),
                (4, "third", 2),
            ]
        );
        assert_eq!(index.ids_for_group(2), 3..5);
        assert_eq!(index.ids_for_group(9), 0..0);
        assert!(normalized.is_complex());
    }

    #[test]
    fn test_query_fasta_headers_restart_per_job() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("query.fas");
        let normalized = normalize(&[record("a", &["AAA", "BBB"]), record("b", &["CCC"])]);

        write_query_fasta(&normalized.jobs, &path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, ">101\nAAA\n>102\nBBB\n>101\nCCC\n");
    }

    #[test]
    fn test_lookup_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qdb.lookup");
        let normalized = normalize(&[record("a", &["AAA", "BBB"]), record("b", &["CCC"])]);

        normalized.index.write_lookup(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "0\ta\t0\n1\ta\t0\n2\tb\t1\n");
    }

    fn raw_jobs() -> impl Strategy<Value = Vec<Vec<String>>> {
        prop::collection::vec(
            prop::collection::vec(prop::sample::select(vec!["AAA", "CCC", "GGG", "MKT"]), 1..6)
                .prop_map(|v| v.into_iter().map(String::from).collect()),
            1..5,
        )
    }

    proptest! {
        #[test]
        fn prop_cardinality_sums_to_raw_count(jobs in raw_jobs()) {
            for raw in &jobs {
                let job = Job::from_raw("job", raw);
                prop_assert_eq!(job.cardinality.iter().sum::<usize>(), raw.len());
                prop_assert_eq!(job.sequences.len(), job.cardinality.len());

                let mut seen = std::collections::HashSet::new();
                for seq in &job.sequences {
                    prop_assert!(seen.insert(seq));
                }
            }
        }

        #[test]
        fn prop_normalize_is_idempotent(jobs in raw_jobs()) {
            let records: Vec<QueryRecord> = jobs
                .iter()
                .enumerate()
                .map(|(i, raw)| QueryRecord::new(format!("job{}", i), raw.clone()))
                .collect();

            let first = normalize(&records);
            let second = normalize(&records);
            prop_assert_eq!(&first, &second);

            let total: usize = first.jobs.iter().map(|j| j.sequences.len()).sum();
            prop_assert_eq!(first.index.len(), total);
            for (id, entry) in first.index.iter().enumerate() {
                prop_assert_eq!(entry.id, id);
            }
        }
    }
}
