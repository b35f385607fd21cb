//! Per-job result assembly
//!
//! The engine unpacks one file per query key (`<id>.a3m`, `<id>.paired.a3m`,
//! `<id>.m8`). Each job gets a single combined MSA named after the job:
//!
//! ```text
//! #<len1>,<len2>,...<TAB><card1>,<card2>,...
//! <paired block: one row per paired hit, chains concatenated>
//! <unpaired block: each chain's hits padded with gaps for the other chains>
//! ```

use crate::error::{SearchError, SearchResult};
use crate::pipeline::monomer::{MSA_SUFFIX, TEMPLATE_SUFFIX};
use crate::pipeline::pair::PAIRED_SUFFIX;
use crate::query::{Job, NormalizedQueries};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Keep ASCII alphanumerics and `_.-`, replace everything else with `_`
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Combine a job's per-chain MSAs into one document
pub fn msa_to_string(
    job: &Job,
    unpaired: &[String],
    paired: Option<&[String]>,
) -> SearchResult<String> {
    if unpaired.len() != job.sequences.len() {
        return Err(SearchError::InvalidInput(format!(
            "job {} has {} chains but {} alignments",
            job.name,
            job.sequences.len(),
            unpaired.len()
        )));
    }

    let lengths: Vec<String> = job.sequences.iter().map(|s| s.len().to_string()).collect();
    let cardinality: Vec<String> = job.cardinality.iter().map(|c| c.to_string()).collect();
    let mut msa = format!("#{}\t{}\n", lengths.join(","), cardinality.join(","));

    if let Some(paired) = paired {
        msa.push_str(&pair_sequences(&job.name, paired)?);
        msa.push('\n');
    }
    msa.push_str(&pad_sequences(unpaired, &job.sequences));
    msa.push('\n');
    Ok(msa)
}

/// Row-wise concatenation of the paired MSAs; later chains' headers are tab-joined
fn pair_sequences(job_name: &str, paired: &[String]) -> SearchResult<String> {
    let Some(first) = paired.first() else {
        return Ok(String::new());
    };
    let mut rows: Vec<String> = vec![String::new(); first.lines().count()];

    for (n, msa) in paired.iter().enumerate() {
        for (i, line) in msa.lines().enumerate() {
            let row = rows.get_mut(i).ok_or_else(|| {
                SearchError::Parse(format!(
                    "paired alignment of chain {} in job {} has more rows than chain 0",
                    n, job_name
                ))
            })?;
            match line.strip_prefix('>') {
                Some(header) if n != 0 => {
                    row.push('\t');
                    row.push_str(header);
                }
                _ => row.push_str(line),
            }
        }
    }

    Ok(rows.join("\n"))
}

/// Each chain's hits with gap blocks standing in for the other chains
fn pad_sequences(unpaired: &[String], sequences: &[String]) -> String {
    let blanks: Vec<String> = sequences.iter().map(|s| "-".repeat(s.len())).collect();
    let mut lines = Vec::new();

    for (pos, msa) in unpaired.iter().enumerate() {
        for line in msa.lines().filter(|l| !l.is_empty()) {
            if line.starts_with('>') {
                lines.push(line.to_string());
            } else {
                let mut row = String::new();
                for (k, blank) in blanks.iter().enumerate() {
                    row.push_str(if k == pos { line } else { blank });
                }
                lines.push(row);
            }
        }
    }

    lines.join("\n")
}

fn read_unpacked(path: &Path) -> SearchResult<String> {
    let content = fs::read_to_string(path).map_err(|e| {
        SearchError::Io(io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    // Unpacked entries may keep the engine's record terminator
    Ok(content.replace('\0', ""))
}

/// Build every job's combined MSA (and template hit file), then delete the
/// per-sequence inputs.
///
/// All inputs are read before anything is written, so a job named like a
/// numeric key cannot clobber another job's input.
pub fn assemble_results(
    root: &Path,
    queries: &NormalizedQueries,
    paired: bool,
    template_db: Option<&str>,
) -> SearchResult<Vec<PathBuf>> {
    let mut pending: Vec<(PathBuf, String)> = Vec::new();
    let mut consumed: Vec<PathBuf> = Vec::new();

    for (group, job) in queries.jobs.iter().enumerate() {
        let ids = queries.index.ids_for_group(group);

        let unpaired = ids
            .clone()
            .map(|id| read_unpacked(&root.join(format!("{}{}", id, MSA_SUFFIX))))
            .collect::<SearchResult<Vec<_>>>()?;
        consumed.extend(ids.clone().map(|id| root.join(format!("{}{}", id, MSA_SUFFIX))));

        let paired_msas = if paired && job.is_complex() {
            Some(
                ids.clone()
                    .map(|id| read_unpacked(&root.join(format!("{}{}", id, PAIRED_SUFFIX))))
                    .collect::<SearchResult<Vec<_>>>()?,
            )
        } else {
            None
        };
        if paired {
            consumed.extend(ids.clone().map(|id| root.join(format!("{}{}", id, PAIRED_SUFFIX))));
        }

        let name = safe_filename(&job.name);
        let msa = msa_to_string(job, &unpaired, paired_msas.as_deref())?;
        pending.push((root.join(format!("{}{}", name, MSA_SUFFIX)), msa));

        if let Some(template_db) = template_db {
            let mut hits = String::new();
            for id in ids.clone() {
                let path = root.join(format!("{}{}", id, TEMPLATE_SUFFIX));
                if path.exists() {
                    hits.push_str(&read_unpacked(&path)?);
                    consumed.push(path);
                }
            }
            pending.push((
                root.join(format!("{}_{}{}", name, template_db, TEMPLATE_SUFFIX)),
                hits,
            ));
        }
    }

    for path in &consumed {
        if path.exists() {
            debug!("Removing {}", path.display());
            fs::remove_file(path)?;
        }
    }

    let mut outputs = Vec::with_capacity(pending.len());
    for (path, content) in pending {
        if outputs.contains(&path) {
            warn!("{} is written by more than one job", path.display());
        }
        fs::write(&path, content)?;
        info!("Wrote {}", path.display());
        outputs.push(path);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{normalize, QueryRecord};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn job(name: &str, chains: &[&str]) -> Job {
        Job::from_raw(name, chains)
    }

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("my job/1 (A:B)"), "my_job_1__A_B_");
        assert_eq!(safe_filename("T1050-v2.final"), "T1050-v2.final");
        assert_eq!(safe_filename("ü"), "_");
    }

    #[test]
    fn test_monomer_msa() {
        let job = job("mono", &["MKV"]);
        let unpaired = vec![">101\nMKV\n>UniRef100_X\nMRV\n".to_string()];

        let msa = msa_to_string(&job, &unpaired, None).unwrap();
        assert_eq!(msa, "#3\t1\n>101\nMKV\n>UniRef100_X\nMRV\n");
    }

    #[test]
    fn test_complex_msa_pairs_then_pads() {
        let job = job("dimer", &["AAA", "CC", "AAA"]);
        assert_eq!(job.cardinality, vec![2, 1]);

        let unpaired = vec![">101\nAAA\n>hit1\nAGA".to_string(), ">102\nCC\n>hit2\nCD".to_string()];
        let paired = vec![">101\nAAA\n>p1\nAAG".to_string(), ">102\nCC\n>p2\nCE".to_string()];

        let msa = msa_to_string(&job, &unpaired, Some(&paired)).unwrap();
        assert_eq!(
            msa,
            concat!(
                "#3,2\t2,1\n",
                ">101\t102\nAAACC\n>p1\tp2\nAAGCE\n",
                ">101\nAAA--\n>hit1\nAGA--\n>102\n---CC\n>hit2\n---CD\n",
            )
        );
    }

    #[test]
    fn test_paired_row_mismatch_is_error() {
        let job = job("dimer", &["AA", "CC"]);
        let unpaired = vec![">101\nAA".to_string(), ">102\nCC".to_string()];
        let paired = vec![">101\nAA".to_string(), ">102\nCC\n>extra\nCD".to_string()];

        let err = msa_to_string(&job, &unpaired, Some(&paired)).unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }

    #[test]
    fn test_assemble_results_writes_per_job_files() {
        let dir = TempDir::new().unwrap();
        let queries = normalize(&[
            QueryRecord::new("job one", vec!["MKV".to_string()]),
            QueryRecord::new("job2", vec!["AA".to_string(), "CC".to_string()]),
        ]);

        fs::write(dir.path().join("0.a3m"), ">101\nMKV\n\0").unwrap();
        fs::write(dir.path().join("1.a3m"), ">101\nAA\n").unwrap();
        fs::write(dir.path().join("2.a3m"), ">102\nCC\n").unwrap();
        for id in 0..3 {
            fs::write(dir.path().join(format!("{}.paired.a3m", id)), ">x\nAA\n").unwrap();
        }
        fs::write(dir.path().join("1.m8"), "101\t1abc_A\t0.9\n").unwrap();

        let outputs = assemble_results(dir.path(), &queries, true, Some("pdb100")).unwrap();

        assert_eq!(
            outputs,
            vec![
                dir.path().join("job_one.a3m"),
                dir.path().join("job_one_pdb100.m8"),
                dir.path().join("job2.a3m"),
                dir.path().join("job2_pdb100.m8"),
            ]
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("job_one.a3m")).unwrap(),
            "#3\t1\n>101\nMKV\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("job2_pdb100.m8")).unwrap(),
            "101\t1abc_A\t0.9\n"
        );
        for name in ["0.a3m", "1.a3m", "2.a3m", "0.paired.a3m", "2.paired.a3m", "1.m8"] {
            assert!(!dir.path().join(name).exists(), "{} should be consumed", name);
        }
    }

    #[test]
    fn test_assemble_results_missing_input() {
        let dir = TempDir::new().unwrap();
        let queries = normalize(&[QueryRecord::new("solo", vec!["MKV".to_string()])]);

        let err = assemble_results(dir.path(), &queries, false, None).unwrap_err();
        assert!(matches!(err, SearchError::Io(ref e) if e.to_string().contains("0.a3m")));
    }
}
