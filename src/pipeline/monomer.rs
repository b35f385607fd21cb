//! Monomer pipeline: per-sequence unpaired MSAs
//!
//! ```text
//! SEARCH → RENAME_PROFILE → LINK_HEADER → [TEMPLATE_SEARCH → TEMPLATE_CONVERT]
//!   → EXPAND_ALIGNMENT → REALIGN → FILTER_RESULT → FORMAT_MSA
//!   → [ENV_SEARCH → ENV_EXPAND → ENV_REALIGN → ENV_FILTER → ENV_FORMAT_MSA]
//!   → FINALIZE_RENAME → UNPACK → [TEMPLATE_UNPACK] → CLEANUP
//! ```
//!
//! Bracketed stages are selected by [`StageToggles`] when the pipeline is
//! built. Any engine failure aborts the pipeline and skips CLEANUP, so the
//! working directory keeps everything produced so far.

use crate::config::StageToggles;
use crate::error::{SearchError, SearchResult};
use crate::pipeline::database::{DbHandle, ReferenceDb};
use crate::pipeline::janitor::{Artifact, CleanupReport};
use crate::pipeline::stage::{run_steps, Stage, Step, TeardownPolicy};
use crate::pipeline::workspace::{PipelineRun, TMP_DIR};
use crate::pipeline::PipelineContext;
use crate::tools::Invocation;
use std::fmt;

pub const PIPELINE: &str = "monomer";

pub const RES: &str = "res";
pub const PROFILE: &str = "latest/profile_1";
pub const PROF_RES: &str = "prof_res";
pub const RES_EXP: &str = "res_exp";
/// Kept after the monomer run; the pairing pipeline starts from it
pub const RES_EXP_REALIGN: &str = "res_exp_realign";
pub const RES_EXP_REALIGN_FILTER: &str = "res_exp_realign_filter";
pub const UNIREF_A3M: &str = "uniref.a3m";
pub const FINAL_A3M: &str = "final.a3m";

pub const TEMPLATE_TMP: &str = "tmp2";
pub const RES_PDB: &str = "res_pdb";
pub const RES_TEMPLATES: &str = "res_templates";
pub const TEMPLATE_SENSITIVITY: &str = "7.5";
pub const TEMPLATE_FORMAT: &str =
    "query,target,fident,alnlen,mismatch,gapopen,qstart,qend,tstart,tend,evalue,bits,cigar";

pub const ENV_TMP: &str = "tmp3";
pub const RES_ENV: &str = "res_env";
pub const RES_ENV_EXP: &str = "res_env_exp";
pub const RES_ENV_EXP_REALIGN: &str = "res_env_exp_realign";
pub const RES_ENV_EXP_REALIGN_FILTER: &str = "res_env_exp_realign_filter";
pub const ENV_A3M: &str = "bfd.mgnify30.metaeuk30.smag30.a3m";

/// Extension of the unpacked per-sequence MSAs
pub const MSA_SUFFIX: &str = ".a3m";
/// Extension of the unpacked per-sequence template hits
pub const TEMPLATE_SUFFIX: &str = ".m8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonomerStage {
    Search,
    RenameProfile,
    LinkHeader,
    TemplateSearch,
    TemplateConvert,
    ExpandAlignment,
    Realign,
    FilterResult,
    FormatMsa,
    EnvSearch,
    EnvExpand,
    EnvRealign,
    EnvFilter,
    EnvFormatMsa,
    FinalizeRename,
    Unpack,
    TemplateUnpack,
    Cleanup,
}

impl MonomerStage {
    /// Ordered states for a given set of toggles
    pub fn plan(toggles: StageToggles) -> Vec<MonomerStage> {
        use MonomerStage::*;

        let mut plan = vec![Search, RenameProfile, LinkHeader];
        if toggles.use_templates {
            plan.extend([TemplateSearch, TemplateConvert]);
        }
        plan.extend([ExpandAlignment, Realign, FilterResult, FormatMsa]);
        if toggles.use_env {
            plan.extend([EnvSearch, EnvExpand, EnvRealign, EnvFilter, EnvFormatMsa]);
        }
        plan.extend([FinalizeRename, Unpack]);
        if toggles.use_templates {
            plan.push(TemplateUnpack);
        }
        plan.push(Cleanup);
        plan
    }
}

impl fmt::Display for MonomerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonomerStage::Search => "SEARCH",
            MonomerStage::RenameProfile => "RENAME_PROFILE",
            MonomerStage::LinkHeader => "LINK_HEADER",
            MonomerStage::TemplateSearch => "TEMPLATE_SEARCH",
            MonomerStage::TemplateConvert => "TEMPLATE_CONVERT",
            MonomerStage::ExpandAlignment => "EXPAND_ALIGNMENT",
            MonomerStage::Realign => "REALIGN",
            MonomerStage::FilterResult => "FILTER_RESULT",
            MonomerStage::FormatMsa => "FORMAT_MSA",
            MonomerStage::EnvSearch => "ENV_SEARCH",
            MonomerStage::EnvExpand => "ENV_EXPAND",
            MonomerStage::EnvRealign => "ENV_REALIGN",
            MonomerStage::EnvFilter => "ENV_FILTER",
            MonomerStage::EnvFormatMsa => "ENV_FORMAT_MSA",
            MonomerStage::FinalizeRename => "FINALIZE_RENAME",
            MonomerStage::Unpack => "UNPACK",
            MonomerStage::TemplateUnpack => "TEMPLATE_UNPACK",
            MonomerStage::Cleanup => "CLEANUP",
        };
        write!(f, "{}", name)
    }
}

pub struct MonomerPipeline<'a> {
    ctx: PipelineContext<'a>,
    toggles: StageToggles,
    template: Option<&'a ReferenceDb>,
    environmental: Option<&'a ReferenceDb>,
}

impl<'a> MonomerPipeline<'a> {
    /// Fails if a toggle selects a database that was not resolved
    pub fn new(ctx: PipelineContext<'a>, toggles: StageToggles) -> SearchResult<Self> {
        let template = if toggles.use_templates {
            Some(ctx.databases.template().ok_or_else(|| {
                SearchError::Configuration(
                    "template stage enabled without a template database".to_string(),
                )
            })?)
        } else {
            None
        };
        let environmental = if toggles.use_env {
            Some(ctx.databases.environmental().ok_or_else(|| {
                SearchError::Configuration(
                    "environment stage enabled without an environmental database".to_string(),
                )
            })?)
        } else {
            None
        };

        Ok(Self {
            ctx,
            toggles,
            template,
            environmental,
        })
    }

    pub fn plan(&self) -> Vec<MonomerStage> {
        MonomerStage::plan(self.toggles)
    }

    /// Run every stage, then sweep the temporaries on success
    pub fn run(&self, run: &mut PipelineRun) -> SearchResult<CleanupReport> {
        let steps = self.steps(run);
        run_steps(self.ctx.tool, run, PIPELINE, &steps, TeardownPolicy::OnSuccess)
    }

    /// Build the concrete step list for this run directory
    pub fn steps(&self, run: &PipelineRun) -> Vec<Step<MonomerStage>> {
        let mut steps = vec![self.search(run), self.rename_profile(run), self.link_header(run)];

        if let Some(template) = self.template {
            steps.push(self.template_search(run, template));
            steps.push(self.template_convert(run, template));
        }

        steps.extend([
            self.expand_alignment(run),
            self.realign(run),
            self.filter_result(run),
            self.format_msa(run),
        ]);

        if let Some(env) = self.environmental {
            steps.extend([
                self.env_search(run, env),
                self.env_expand(run, env),
                self.env_realign(run, env),
                self.env_filter(run, env),
                self.env_format_msa(run, env),
            ]);
        }

        steps.push(self.finalize_rename(run));
        steps.push(self.unpack(run));
        if self.template.is_some() {
            steps.push(self.template_unpack(run));
        }
        steps.push(Step::Sweep {
            state: MonomerStage::Cleanup,
            artifacts: self.scratch_artifacts(run),
        });

        steps
    }

    /// Everything CLEANUP removes. `res_exp_realign` is not listed.
    pub fn scratch_artifacts(&self, run: &PipelineRun) -> Vec<Artifact> {
        let mut dbs = vec![RES_EXP, RES, RES_EXP_REALIGN_FILTER, UNIREF_A3M, FINAL_A3M];
        if self.template.is_some() {
            dbs.extend([RES_PDB, RES_TEMPLATES]);
        }
        if self.environmental.is_some() {
            dbs.extend([
                RES_ENV,
                RES_ENV_EXP,
                RES_ENV_EXP_REALIGN,
                RES_ENV_EXP_REALIGN_FILTER,
                ENV_A3M,
            ]);
        }

        let mut artifacts: Vec<Artifact> = dbs
            .into_iter()
            .map(|name| Artifact::Database(run.db(name)))
            .collect();
        artifacts.push(Artifact::Files(format!("{}*", PROF_RES)));
        artifacts.push(Artifact::Directory(run.tmp_dir()));
        if self.template.is_some() {
            artifacts.push(Artifact::Directory(run.path(TEMPLATE_TMP)));
        }
        if self.environmental.is_some() {
            artifacts.push(Artifact::Directory(run.path(ENV_TMP)));
        }
        artifacts
    }

    fn uniref(&self) -> &ReferenceDb {
        self.ctx.databases.uniref()
    }

    fn load_mode(&self) -> [String; 2] {
        self.ctx.params.db_load_mode_args()
    }

    fn threads(&self) -> [String; 2] {
        self.ctx.params.threads_args()
    }

    fn profile(&self, run: &PipelineRun, tmp: &str) -> DbHandle {
        run.db(&format!("{}/{}", tmp, PROFILE))
    }

    fn search(&self, run: &PipelineRun) -> Step<MonomerStage> {
        let qdb = run.query_db();
        let res = run.db(RES);
        let invocation = Invocation::new("search")
            .arg(&qdb)
            .arg(self.uniref().root())
            .arg(&res)
            .arg(run.tmp_dir())
            .args(self.threads())
            .args(self.ctx.params.search.to_args());

        Step::Invoke(
            Stage::fatal(MonomerStage::Search, invocation)
                .requiring(qdb)
                .producing(res)
                .producing(self.profile(run, TMP_DIR)),
        )
    }

    fn rename_profile(&self, run: &PipelineRun) -> Step<MonomerStage> {
        let profile = self.profile(run, TMP_DIR);
        let prof_res = run.db(PROF_RES);
        let invocation = Invocation::new("mvdb").arg(&profile).arg(&prof_res);

        Step::Invoke(
            Stage::fatal(MonomerStage::RenameProfile, invocation)
                .requiring(profile.clone())
                .producing(prof_res)
                .retiring(profile),
        )
    }

    fn link_header(&self, run: &PipelineRun) -> Step<MonomerStage> {
        let qdb_h = run.query_db().header();
        let prof_res_h = run.db(PROF_RES).header();
        let invocation = Invocation::new("lndb").arg(&qdb_h).arg(&prof_res_h);

        Step::Invoke(
            Stage::fatal(MonomerStage::LinkHeader, invocation)
                .requiring(qdb_h)
                .producing(prof_res_h),
        )
    }

    fn template_search(&self, run: &PipelineRun, template: &ReferenceDb) -> Step<MonomerStage> {
        let prof_res = run.db(PROF_RES);
        let res_pdb = run.db(RES_PDB);
        let invocation = Invocation::new("search")
            .arg(&prof_res)
            .arg(template.root())
            .arg(&res_pdb)
            .arg(run.path(TEMPLATE_TMP))
            .args(self.load_mode())
            .args(self.threads())
            .args(["-s", TEMPLATE_SENSITIVITY, "-a", "-e", "0.1"]);

        Step::Invoke(
            Stage::fatal(MonomerStage::TemplateSearch, invocation)
                .requiring(prof_res)
                .producing(res_pdb),
        )
    }

    fn template_convert(&self, run: &PipelineRun, template: &ReferenceDb) -> Step<MonomerStage> {
        let res_pdb = run.db(RES_PDB);
        let res_templates = run.db(RES_TEMPLATES);
        let invocation = Invocation::new("convertalis")
            .arg(run.db(PROF_RES))
            .arg(template.templates())
            .arg(&res_pdb)
            .arg(&res_templates)
            .args(["--format-output", TEMPLATE_FORMAT, "--db-output", "1"])
            .args(self.load_mode())
            .args(self.threads());

        Step::Invoke(
            Stage::fatal(MonomerStage::TemplateConvert, invocation)
                .requiring(res_pdb)
                .producing(res_templates),
        )
    }

    fn expand_alignment(&self, run: &PipelineRun) -> Step<MonomerStage> {
        let res = run.db(RES);
        let res_exp = run.db(RES_EXP);
        let invocation = Invocation::new("expandaln")
            .arg(run.query_db())
            .arg(self.uniref().sequences())
            .arg(&res)
            .arg(self.uniref().alignments())
            .arg(&res_exp)
            .args(self.load_mode())
            .args(self.threads())
            .args(self.ctx.params.expand.to_args());

        Step::Invoke(
            Stage::fatal(MonomerStage::ExpandAlignment, invocation)
                .requiring(res)
                .producing(res_exp),
        )
    }

    fn realign(&self, run: &PipelineRun) -> Step<MonomerStage> {
        let prof_res = run.db(PROF_RES);
        let res_exp = run.db(RES_EXP);
        let realigned = run.db(RES_EXP_REALIGN);
        let invocation = Invocation::new("align")
            .arg(&prof_res)
            .arg(self.uniref().sequences())
            .arg(&res_exp)
            .arg(&realigned)
            .args(self.load_mode())
            .args(self.ctx.params.realign_args())
            .args(self.threads())
            .args(["--alt-ali", "10", "-a"]);

        Step::Invoke(
            Stage::fatal(MonomerStage::Realign, invocation)
                .requiring(prof_res)
                .requiring(res_exp)
                .producing(realigned),
        )
    }

    fn filter_result(&self, run: &PipelineRun) -> Step<MonomerStage> {
        let realigned = run.db(RES_EXP_REALIGN);
        let filtered = run.db(RES_EXP_REALIGN_FILTER);
        let invocation = self.prefilter_invocation(run, self.uniref(), &realigned, &filtered);

        Step::Invoke(
            Stage::fatal(MonomerStage::FilterResult, invocation)
                .requiring(realigned)
                .producing(filtered),
        )
    }

    fn format_msa(&self, run: &PipelineRun) -> Step<MonomerStage> {
        let filtered = run.db(RES_EXP_REALIGN_FILTER);
        let msa = run.db(UNIREF_A3M);
        let invocation = self.result2msa(run, self.uniref(), &filtered, &msa);

        Step::Invoke(
            Stage::fatal(MonomerStage::FormatMsa, invocation)
                .requiring(filtered)
                .producing(msa),
        )
    }

    fn env_search(&self, run: &PipelineRun, env: &ReferenceDb) -> Step<MonomerStage> {
        let prof_res = run.db(PROF_RES);
        let res_env = run.db(RES_ENV);
        let invocation = Invocation::new("search")
            .arg(&prof_res)
            .arg(env.root())
            .arg(&res_env)
            .arg(run.path(ENV_TMP))
            .args(self.threads())
            .args(self.ctx.params.search.to_args());

        Step::Invoke(
            Stage::fatal(MonomerStage::EnvSearch, invocation)
                .requiring(prof_res)
                .producing(res_env)
                .producing(self.profile(run, ENV_TMP)),
        )
    }

    fn env_expand(&self, run: &PipelineRun, env: &ReferenceDb) -> Step<MonomerStage> {
        let res_env = run.db(RES_ENV);
        let expanded = run.db(RES_ENV_EXP);
        let invocation = Invocation::new("expandaln")
            .arg(run.db(PROF_RES))
            .arg(env.sequences())
            .arg(&res_env)
            .arg(env.alignments())
            .arg(&expanded)
            .args(self.load_mode())
            .args(self.threads())
            .args(self.ctx.params.expand.to_args());

        Step::Invoke(
            Stage::fatal(MonomerStage::EnvExpand, invocation)
                .requiring(res_env)
                .producing(expanded),
        )
    }

    fn env_realign(&self, run: &PipelineRun, env: &ReferenceDb) -> Step<MonomerStage> {
        let profile = self.profile(run, ENV_TMP);
        let expanded = run.db(RES_ENV_EXP);
        let realigned = run.db(RES_ENV_EXP_REALIGN);
        let invocation = Invocation::new("align")
            .arg(&profile)
            .arg(env.sequences())
            .arg(&expanded)
            .arg(&realigned)
            .args(self.load_mode())
            .args(self.ctx.params.realign_args())
            .args(self.threads())
            .args(["--alt-ali", "10", "-a"]);

        Step::Invoke(
            Stage::fatal(MonomerStage::EnvRealign, invocation)
                .requiring(profile)
                .requiring(expanded)
                .producing(realigned),
        )
    }

    fn env_filter(&self, run: &PipelineRun, env: &ReferenceDb) -> Step<MonomerStage> {
        let realigned = run.db(RES_ENV_EXP_REALIGN);
        let filtered = run.db(RES_ENV_EXP_REALIGN_FILTER);
        let invocation = self.prefilter_invocation(run, env, &realigned, &filtered);

        Step::Invoke(
            Stage::fatal(MonomerStage::EnvFilter, invocation)
                .requiring(realigned)
                .producing(filtered),
        )
    }

    fn env_format_msa(&self, run: &PipelineRun, env: &ReferenceDb) -> Step<MonomerStage> {
        let filtered = run.db(RES_ENV_EXP_REALIGN_FILTER);
        let msa = run.db(ENV_A3M);
        let invocation = self.result2msa(run, env, &filtered, &msa);

        Step::Invoke(
            Stage::fatal(MonomerStage::EnvFormatMsa, invocation)
                .requiring(filtered)
                .producing(msa),
        )
    }

    fn finalize_rename(&self, run: &PipelineRun) -> Step<MonomerStage> {
        let uniref_msa = run.db(UNIREF_A3M);
        let final_msa = run.db(FINAL_A3M);

        let stage = if self.environmental.is_some() {
            let env_msa = run.db(ENV_A3M);
            let invocation = Invocation::new("mergedbs")
                .arg(run.query_db())
                .arg(&final_msa)
                .arg(&uniref_msa)
                .arg(&env_msa);
            Stage::fatal(MonomerStage::FinalizeRename, invocation)
                .requiring(uniref_msa)
                .requiring(env_msa)
                .producing(final_msa)
        } else {
            let invocation = Invocation::new("mvdb").arg(&uniref_msa).arg(&final_msa);
            Stage::fatal(MonomerStage::FinalizeRename, invocation)
                .requiring(uniref_msa.clone())
                .producing(final_msa)
                .retiring(uniref_msa)
        };

        Step::Invoke(stage)
    }

    fn unpack(&self, run: &PipelineRun) -> Step<MonomerStage> {
        let final_msa = run.db(FINAL_A3M);
        let invocation = unpack_invocation(&final_msa, run, MSA_SUFFIX);
        Step::Invoke(Stage::fatal(MonomerStage::Unpack, invocation).requiring(final_msa))
    }

    fn template_unpack(&self, run: &PipelineRun) -> Step<MonomerStage> {
        let res_templates = run.db(RES_TEMPLATES);
        let invocation = unpack_invocation(&res_templates, run, TEMPLATE_SUFFIX);
        Step::Invoke(
            Stage::fatal(MonomerStage::TemplateUnpack, invocation).requiring(res_templates),
        )
    }

    /// `filterresult` ahead of MSA formatting: no identity filter, score cutoff only
    fn prefilter_invocation(
        &self,
        run: &PipelineRun,
        target: &ReferenceDb,
        input: &DbHandle,
        output: &DbHandle,
    ) -> Invocation {
        Invocation::new("filterresult")
            .arg(run.query_db())
            .arg(target.sequences())
            .arg(input)
            .arg(output)
            .args(self.load_mode())
            .args(["--qid", "0", "--qsc"])
            .arg(self.ctx.params.qsc_arg())
            .args(["--diff", "0"])
            .args(self.threads())
            .args(["--max-seq-id", "1.0", "--filter-min-enable", "100"])
    }

    fn result2msa(
        &self,
        run: &PipelineRun,
        target: &ReferenceDb,
        input: &DbHandle,
        output: &DbHandle,
    ) -> Invocation {
        Invocation::new("result2msa")
            .arg(run.query_db())
            .arg(target.sequences())
            .arg(input)
            .arg(output)
            .args(["--msa-format-mode", "6"])
            .args(self.load_mode())
            .args(self.threads())
            .args(self.ctx.params.filter.to_args())
    }
}

/// `unpackdb` into the run directory, one file per query key
pub(crate) fn unpack_invocation(db: &DbHandle, run: &PipelineRun, suffix: &str) -> Invocation {
    Invocation::new("unpackdb")
        .arg(db)
        .arg(run.root())
        .args(["--unpack-name-mode", "0", "--unpack-suffix", suffix])
}
