/// Shared fixtures for the integration tests
///
/// `FakeMmseqs` stands in for the real binary: it creates, moves and removes
/// database files the way MMseqs2 does, so the pipelines see the same
/// filesystem state they would in production.
use msa_search::config::{Config, DatabaseSettings};
use msa_search::tools::{Invocation, SearchTool};
use msa_search::{SearchError, SearchResult};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub const UNIREF: &str = "uniref30_2302_db";
pub const TEMPLATES: &str = "pdb100_230517";
pub const ENVDB: &str = "colabfold_envdb_202108_db";

const DB_EXTENSIONS: [&str; 3] = ["", ".dbtype", ".index"];

/// Filesystem simulation of the MMseqs2 subcommands the pipelines use
#[derive(Debug, Default)]
pub struct FakeMmseqs {
    calls: Mutex<Vec<Invocation>>,
    fail_on: Option<String>,
}

impl FakeMmseqs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first call of `command`
    pub fn failing_on(command: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(command.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| c.iter().map(|i| i.command.clone()).collect())
            .unwrap_or_default()
    }

    fn simulate(&self, inv: &Invocation) -> std::io::Result<()> {
        let arg = |i: usize| PathBuf::from(&inv.args[i]);

        match inv.command.as_str() {
            "createdb" => {
                let qdb = arg(1);
                create_db(&qdb)?;
                create_db(&with_suffix(&qdb, "_h"))?;
            }
            "search" => {
                create_db(&arg(2))?;
                let profile = arg(3).join("latest").join("profile_1");
                fs::create_dir_all(arg(3).join("latest"))?;
                create_db(&profile)?;
            }
            "mvdb" => {
                let (from, to) = (arg(0), arg(1));
                for ext in DB_EXTENSIONS {
                    let source = with_suffix(&from, ext);
                    if source.exists() {
                        fs::rename(source, with_suffix(&to, ext))?;
                    }
                }
            }
            "lndb" => create_db(&arg(1))?,
            "rmdb" => {
                for ext in DB_EXTENSIONS {
                    let path = with_suffix(&arg(0), ext);
                    if path.exists() {
                        fs::remove_file(path)?;
                    }
                }
            }
            "expandaln" => create_db(&arg(4))?,
            "align" | "filterresult" | "result2msa" | "convertalis" | "pairaln" => {
                create_db(&arg(3))?
            }
            "mergedbs" => create_db(&arg(1))?,
            "unpackdb" => {
                let suffix = inv
                    .flag_value("--unpack-suffix")
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let out = arg(1);
                for id in lookup_ids(&out.join("qdb.lookup"))? {
                    fs::write(out.join(format!("{}{}", id, suffix)), unpacked(id, &suffix))?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl SearchTool for FakeMmseqs {
    fn execute(&self, invocation: &Invocation) -> SearchResult<()> {
        let first_of_kind = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| SearchError::Other("lock poisoned".to_string()))?;
            let seen = calls.iter().any(|c| c.command == invocation.command);
            calls.push(invocation.clone());
            !seen
        };

        if first_of_kind && self.fail_on.as_deref() == Some(invocation.command.as_str()) {
            return Err(SearchError::ToolFailure {
                command: invocation.command.clone(),
                exit_code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }

        self.simulate(invocation).map_err(|e| SearchError::ToolFailure {
            command: invocation.command.clone(),
            exit_code: Some(1),
            stderr: e.to_string(),
        })
    }
}

/// Unpacked entry content, distinct per id and kind
pub fn unpacked(id: usize, suffix: &str) -> String {
    match suffix {
        ".paired.a3m" => format!(">p{}\nPAIR{}\n", id, id),
        ".m8" => format!("101\thit{}\t0.9\n", id),
        _ => format!(">q{}\nSEQ{}\n\0", id, id),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn create_db(path: &Path) -> std::io::Result<()> {
    fs::write(with_suffix(path, ".dbtype"), [0u8; 4])?;
    fs::write(with_suffix(path, ".index"), "")?;
    fs::write(path, "")
}

fn lookup_ids(path: &Path) -> std::io::Result<Vec<usize>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .filter_map(|l| l.split('\t').next())
        .filter_map(|id| id.parse().ok())
        .collect())
}

/// A database root holding indexed reference databases
pub struct TestEnvironment {
    pub dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_index(true)
    }

    /// Databases without precomputed `.idx` files
    #[allow(dead_code)]
    pub fn unindexed() -> Self {
        Self::with_index(false)
    }

    fn with_index(indexed: bool) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("db")).expect("Failed to create db dir");
        for name in [UNIREF, TEMPLATES, ENVDB] {
            let root = dir.path().join("db").join(name);
            fs::write(with_suffix(&root, ".dbtype"), [0u8; 4]).expect("dbtype");
            if indexed {
                fs::write(with_suffix(&root, ".idx"), "").expect("idx");
            }
        }
        TestEnvironment { dir }
    }

    pub fn dbbase(&self) -> PathBuf {
        self.dir.path().join("db")
    }

    pub fn base(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn config(&self, use_env: bool, use_templates: bool) -> Config {
        let mut config = Config::default();
        config.databases = DatabaseSettings {
            uniref_db: UNIREF.to_string(),
            template_db: TEMPLATES.to_string(),
            metagenomic_db: ENVDB.to_string(),
            use_env: Some(use_env),
            use_templates: Some(use_templates),
        };
        config
    }
}

/// Names of the files left in a directory, sorted
#[allow(dead_code)]
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
