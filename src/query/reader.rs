//! Query source readers
//!
//! Accepts a FASTA file, a CSV/TSV table with `id` and `sequence` columns, or a
//! directory of FASTA files. In every format a `:` inside a sequence separates
//! the chains of a complex.

use crate::error::{SearchError, SearchResult};
use nom::{
    bytes::complete::{tag, take_till},
    character::complete::not_line_ending,
    combinator::map,
    IResult,
};
use std::fs;
use std::path::{Path, PathBuf};

/// One job as read from the query source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    pub job_name: String,
    /// Raw chain list, duplicates preserved
    pub sequences: Vec<String>,
}

impl QueryRecord {
    pub fn new(job_name: impl Into<String>, sequences: Vec<String>) -> Self {
        Self {
            job_name: job_name.into(),
            sequences,
        }
    }
}

const FASTA_EXTENSIONS: &[&str] = &["fasta", "fa", "faa"];

/// Read queries from a file or directory, keeping input order
pub fn read_queries<P: AsRef<Path>>(path: P) -> SearchResult<Vec<QueryRecord>> {
    let path = path.as_ref();

    if path.is_dir() {
        return read_fasta_dir(path);
    }

    let records = match extension(path).as_deref() {
        Some("csv") => read_table(path, b',')?,
        Some("tsv") => read_table(path, b'\t')?,
        _ => read_fasta_file(path)?,
    };

    if records.is_empty() {
        return Err(SearchError::InvalidInput(format!(
            "No queries found in {}",
            path.display()
        )));
    }
    Ok(records)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn read_fasta_file(path: &Path) -> SearchResult<Vec<QueryRecord>> {
    let contents = fs::read_to_string(path)?;
    parse_fasta_queries(&contents)
}

/// One job per file, named after the file stem, built from the file's first record
fn read_fasta_dir(dir: &Path) -> SearchResult<Vec<QueryRecord>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && extension(p)
                    .map(|e| FASTA_EXTENSIONS.contains(&e.as_str()))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();

    let mut records = Vec::with_capacity(files.len());
    for file in files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut parsed = read_fasta_file(&file)?;
        if parsed.is_empty() {
            return Err(SearchError::Parse(format!(
                "No sequence in {}",
                file.display()
            )));
        }
        let mut first = parsed.swap_remove(0);
        first.job_name = stem;
        records.push(first);
    }

    if records.is_empty() {
        return Err(SearchError::InvalidInput(format!(
            "No FASTA files found in {}",
            dir.display()
        )));
    }
    Ok(records)
}

fn read_table(path: &Path, delimiter: u8) -> SearchResult<Vec<QueryRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
            SearchError::Parse(format!(
                "{} has no '{}' column",
                path.display(),
                name
            ))
        })
    };
    let id_col = column("id")?;
    let seq_col = column("sequence")?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let job_name = row.get(id_col).unwrap_or_default().trim().to_string();
        let sequences = split_chains(row.get(seq_col).unwrap_or_default(), &job_name)?;
        records.push(QueryRecord::new(job_name, sequences));
    }
    Ok(records)
}

/// Parse a FASTA header line, returning the full title after `>`
fn parse_header(input: &str) -> IResult<&str, &str> {
    let (input, _) = tag(">")(input)?;
    map(not_line_ending, str::trim)(input)
}

/// Take sequence text up to the next header
fn parse_body(input: &str) -> IResult<&str, &str> {
    take_till(|c: char| c == '>')(input)
}

/// Parse FASTA text into query records; `:` splits chains
pub fn parse_fasta_queries(contents: &str) -> SearchResult<Vec<QueryRecord>> {
    let mut records = Vec::new();
    let mut input = contents.trim_start();

    while !input.is_empty() {
        let (rest, title) = parse_header(input)
            .map_err(|e| SearchError::Parse(format!("Failed to parse FASTA header: {:?}", e)))?;
        let (rest, body) = parse_body(rest)
            .map_err(|e| SearchError::Parse(format!("Failed to parse FASTA body: {:?}", e)))?;

        let joined: String = body.split_whitespace().collect();
        let sequences = split_chains(&joined, title)?;
        records.push(QueryRecord::new(title, sequences));

        input = rest.trim_start();
    }

    Ok(records)
}

fn split_chains(raw: &str, job_name: &str) -> SearchResult<Vec<String>> {
    let chains: Vec<String> = raw
        .split(':')
        .map(|chain| {
            chain
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_uppercase()
        })
        .collect();

    if chains.iter().any(|c| c.is_empty()) {
        return Err(SearchError::Parse(format!(
            "Query '{}' contains an empty sequence",
            job_name
        )));
    }
    Ok(chains)
}
