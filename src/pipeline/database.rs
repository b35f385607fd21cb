//! Engine database handles and reference database resolution

use crate::config::{DatabaseSettings, StageToggles};
use crate::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// An on-disk engine database identified by its base path.
///
/// The engine stores a database as `<base>`, `<base>.index`, `<base>.dbtype`
/// and optionally numbered data shards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbHandle {
    path: PathBuf,
}

impl DbHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dbtype_path(&self) -> PathBuf {
        with_suffix(&self.path, ".dbtype")
    }

    pub fn index_path(&self) -> PathBuf {
        with_suffix(&self.path, ".index")
    }

    /// Companion header database (`<base>_h`)
    pub fn header(&self) -> DbHandle {
        DbHandle::new(with_suffix(&self.path, "_h"))
    }

    /// True when any of the database's files is present
    pub fn exists(&self) -> bool {
        self.dbtype_path().is_file() || self.index_path().is_file() || self.path.is_file()
    }
}

impl AsRef<OsStr> for DbHandle {
    fn as_ref(&self) -> &OsStr {
        self.path.as_os_str()
    }
}

impl AsRef<Path> for DbHandle {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for DbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Append a raw suffix to the last path component
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Whether a reference database ships a prebuilt index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexLayout {
    Indexed,
    Unindexed,
}

impl IndexLayout {
    /// Unindexed only when both `<db>.idx` and `<db>.idx.index` are missing
    pub fn detect(root: &Path) -> Self {
        let idx = with_suffix(root, ".idx");
        let idx_index = with_suffix(root, ".idx.index");
        if !idx.is_file() && !idx_index.is_file() {
            IndexLayout::Unindexed
        } else {
            IndexLayout::Indexed
        }
    }

    pub fn sequence_suffix(&self) -> &'static str {
        match self {
            IndexLayout::Indexed => ".idx",
            IndexLayout::Unindexed => "_seq",
        }
    }

    pub fn alignment_suffix(&self) -> &'static str {
        match self {
            IndexLayout::Indexed => ".idx",
            IndexLayout::Unindexed => "_aln",
        }
    }

    /// Suffix for template lookups during `convertalis`
    pub fn template_suffix(&self) -> &'static str {
        match self {
            IndexLayout::Indexed => ".idx",
            IndexLayout::Unindexed => "",
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, IndexLayout::Indexed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseRole {
    Uniref,
    Template,
    Environmental,
}

impl fmt::Display for DatabaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseRole::Uniref => "uniref",
            DatabaseRole::Template => "template",
            DatabaseRole::Environmental => "environmental",
        };
        write!(f, "{}", name)
    }
}

/// A validated, read-only reference database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDb {
    pub role: DatabaseRole,
    pub name: String,
    root: PathBuf,
    pub layout: IndexLayout,
}

impl ReferenceDb {
    /// Validate `<dbbase>/<name>.dbtype` and detect the index layout
    pub fn open(dbbase: &Path, name: &str, role: DatabaseRole) -> SearchResult<Self> {
        let root = dbbase.join(name);
        let dbtype = with_suffix(&root, ".dbtype");
        if name.is_empty() || !dbtype.is_file() {
            return Err(SearchError::missing_database(name, &dbtype));
        }

        let layout = IndexLayout::detect(&root);
        if !layout.is_indexed() {
            info!("Search does not use index for {} database {}", role, name);
        }

        Ok(Self {
            role,
            name: name.to_string(),
            root,
            layout,
        })
    }

    /// The database itself (`<dbbase>/<name>`)
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sequence sub-database consumed by expand/align/filter/format stages
    pub fn sequences(&self) -> PathBuf {
        with_suffix(&self.root, self.layout.sequence_suffix())
    }

    /// Alignment sub-database consumed by the expand stage
    pub fn alignments(&self) -> PathBuf {
        with_suffix(&self.root, self.layout.alignment_suffix())
    }

    pub fn templates(&self) -> PathBuf {
        with_suffix(&self.root, self.layout.template_suffix())
    }
}

/// Every reference database a run reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDatabases {
    uniref: ReferenceDb,
    template: Option<ReferenceDb>,
    environmental: Option<ReferenceDb>,
}

impl ReferenceDatabases {
    /// Check that every database the toggles select exists under `dbbase`
    pub fn resolve(
        dbbase: &Path,
        settings: &DatabaseSettings,
        toggles: StageToggles,
    ) -> SearchResult<Self> {
        let uniref = ReferenceDb::open(dbbase, &settings.uniref_db, DatabaseRole::Uniref)?;
        let template = if toggles.use_templates {
            Some(ReferenceDb::open(
                dbbase,
                &settings.template_db,
                DatabaseRole::Template,
            )?)
        } else {
            None
        };
        let environmental = if toggles.use_env {
            Some(ReferenceDb::open(
                dbbase,
                &settings.metagenomic_db,
                DatabaseRole::Environmental,
            )?)
        } else {
            None
        };

        Ok(Self {
            uniref,
            template,
            environmental,
        })
    }

    pub fn uniref(&self) -> &ReferenceDb {
        &self.uniref
    }

    pub fn template(&self) -> Option<&ReferenceDb> {
        self.template.as_ref()
    }

    pub fn environmental(&self) -> Option<&ReferenceDb> {
        self.environmental.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceDb> {
        std::iter::once(&self.uniref)
            .chain(self.template.as_ref())
            .chain(self.environmental.as_ref())
    }

    /// False as soon as one used database lacks an index
    pub fn all_indexed(&self) -> bool {
        self.iter().all(|db| db.layout.is_indexed())
    }
}
