/* Orchestration of a full patch run over a listing tree: scan, classify,
   synthesize, apply, report. Files are planned and patched in parallel;
   the ledger collects every attempt. */

use crate::apply::apply;
use crate::collab::{AdvisoryOracle, ApkSigner, ArchiveTooling};
use crate::ledger::{Ledger, SharedLedger};
use crate::rules::RuleSet;
use crate::scan::scan_listing;
use crate::synth::synthesize;
use crate::types::{ModificationRecord, PatchAction};
use crate::{find_listing_files, read_listing};
use log::{debug, error, info, warn};
use rangemap::RangeMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle phase of a [PatchRun].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Scanning,
    Patching,
    Finalized,
    Failed,
}

impl RunState {
    pub fn to_str(&self) -> &str {
        match self {
            RunState::Idle => "idle",
            RunState::Scanning => "scanning",
            RunState::Patching => "patching",
            RunState::Finalized => "finalized",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// Cooperative cancellation flag. Clones share the same flag; once set it
/// stays set. Files not yet planned when the flag trips are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken { flag: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum RunError {
    Io(io::Error),
    Unpack(String),
    Repack(String),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunError::Io(err) => write!(f, "I/O error: {err}"),
            RunError::Unpack(msg) => write!(f, "unpack failed: {msg}"),
            RunError::Repack(msg) => write!(f, "repack failed: {msg}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<io::Error> for RunError {
    fn from(err: io::Error) -> RunError {
        RunError::Io(err)
    }
}

/// One file the run could not fully process. The rest of the run carries on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub error: String,
}

/// Aggregate outcome of a patch run.
///
/// `patches_attempted` counts every ledger entry, including skipped ones;
/// `patches_applied` counts the entries that changed (or already carried)
/// the desired body. `signed` stays `None` unless a signer was involved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub files_scanned: usize,
    pub methods_seen: usize,
    pub methods_classified: usize,
    pub patches_attempted: usize,
    pub patches_applied: usize,
    pub ledger: Ledger,
    pub failures: Vec<FileFailure>,
    pub recommendations: Vec<String>,
    pub signed: Option<bool>,
    pub cancelled: bool,
    pub state: RunState,
}

/// Everything planned for one file before any of it is written back.
#[derive(Debug)]
struct FilePlan {
    file: PathBuf,
    methods_seen: usize,
    methods_classified: usize,
    actions: Vec<PatchAction>,
    records: Vec<ModificationRecord>,
    failure: Option<String>,
    scanned: bool,
}

impl FilePlan {
    fn new(file: &Path) -> FilePlan {
        FilePlan {
            file: file.to_path_buf(),
            methods_seen: 0,
            methods_classified: 0,
            actions: vec![],
            records: vec![],
            failure: None,
            scanned: false,
        }
    }
}

/// Drives a whole run: walks the tree, plans every file, applies the
/// planned patches bottom-up and assembles a [RunReport].
///
/// # Examples
///
/// ```no_run
/// use smalipatch::rules::RuleSet;
/// use smalipatch::run::PatchRun;
/// use std::path::Path;
///
/// let mut run = PatchRun::new(RuleSet::default());
/// let report = run.execute(Path::new("unpacked/smali")).unwrap();
/// println!("{} of {} patches applied", report.patches_applied, report.patches_attempted);
/// ```
pub struct PatchRun {
    rules: RuleSet,
    cancel: CancelToken,
    state: RunState,
    advisor: Option<Box<dyn AdvisoryOracle + Send + Sync>>,
}

impl PatchRun {
    pub fn new(rules: RuleSet) -> PatchRun {
        PatchRun { rules, cancel: CancelToken::new(), state: RunState::Idle, advisor: None }
    }

    /// Attaches an advisory oracle consulted after patching. Its notes end
    /// up in [RunReport::recommendations] and nowhere else.
    pub fn with_advisor(mut self, advisor: Box<dyn AdvisoryOracle + Send + Sync>) -> PatchRun {
        self.advisor = Some(advisor);
        self
    }

    /// A handle that can cancel this run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs scan and patch phases over every listing under `root`.
    ///
    /// Per-file problems are reported in [RunReport::failures]; only a
    /// failure to walk the tree itself aborts the run.
    pub fn execute(&mut self, root: &Path) -> Result<RunReport, RunError> {
        self.state = RunState::Scanning;
        info!("scanning listing tree {}", root.display());
        let files = match find_listing_files(root) {
            Ok(files) => files,
            Err(err) => {
                self.state = RunState::Failed;
                error!("cannot walk {}: {err}", root.display());
                return Err(RunError::Io(err));
            }
        };

        let plans: Vec<FilePlan> = files.par_iter().map(|file| self.plan_file(file)).collect();

        self.state = RunState::Patching;
        let candidates = plans.iter().filter(|p| !p.actions.is_empty()).count();
        info!("patching {candidates} of {} files", plans.len());

        let ledger = SharedLedger::new();
        let failures: Vec<FileFailure> =
            plans.par_iter().filter_map(|plan| self.patch_file(plan, &ledger)).collect();

        let ledger = ledger.into_ledger();
        let recommendations = self.recommendations(&ledger);
        self.state = RunState::Finalized;

        let report = RunReport {
            files_scanned: plans.iter().filter(|p| p.scanned && p.failure.is_none()).count(),
            methods_seen: plans.iter().map(|p| p.methods_seen).sum(),
            methods_classified: plans.iter().map(|p| p.methods_classified).sum(),
            patches_attempted: ledger.len(),
            patches_applied: ledger.applied_count(),
            failures,
            recommendations,
            signed: None,
            cancelled: self.cancel.is_cancelled(),
            state: self.state,
            ledger,
        };
        info!(
            "run finalized: {} of {} patches applied across {} files",
            report.patches_applied, report.patches_attempted, report.files_scanned
        );
        Ok(report)
    }

    /// Scans one file and plans its patches. Nothing is written here.
    fn plan_file(&self, file: &Path) -> FilePlan {
        let mut plan = FilePlan::new(file);
        if self.cancel.is_cancelled() {
            return plan;
        }
        plan.scanned = true;
        let contents = match read_listing(file) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("cannot read {}: {err}", file.display());
                plan.failure = Some(err.to_string());
                return plan;
            }
        };
        for record in scan_listing(&contents, file) {
            plan.methods_seen += 1;
            let classified = self.rules.classify(&record);
            if !classified.is_match() {
                continue;
            }
            plan.methods_classified += 1;
            for category in &classified.categories {
                if let Some(rule) = self.rules.rule(category) {
                    match synthesize(&record, rule) {
                        Ok(action) => plan.actions.push(action),
                        Err(err) => {
                            debug!("cannot patch '{}': {}", record.name, err.reason);
                            plan.records.push(ModificationRecord::skipped_method(
                                &record, category, &err.reason,
                            ));
                        }
                    }
                }
            }
        }
        plan
    }

    /// Applies one file's planned actions and appends the outcome batch.
    fn patch_file(&self, plan: &FilePlan, ledger: &SharedLedger) -> Option<FileFailure> {
        let mut records = plan.records.clone();
        let mut failure = plan
            .failure
            .clone()
            .map(|error| FileFailure { file: plan.file.clone(), error });

        if failure.is_none() && plan.scanned && !plan.actions.is_empty() && !self.cancel.is_cancelled()
        {
            if let Err(err) = self.apply_file(&plan.file, &plan.actions, &mut records) {
                failure = Some(FileFailure { file: plan.file.clone(), error: err.to_string() });
            }
        }
        if !records.is_empty() {
            ledger.append_batch(records);
        }
        failure
    }

    fn apply_file(
        &self,
        path: &Path,
        actions: &[PatchAction],
        records: &mut Vec<ModificationRecord>,
    ) -> io::Result<()> {
        let mut contents = read_listing(path)?;

        // Bottom-up so an earlier splice cannot shift a later span.
        let mut ordered: Vec<&PatchAction> = actions.iter().collect();
        ordered.sort_by(|a, b| b.target.span.start.cmp(&a.target.span.start));

        // Claims are keyed by their own start line, so neighbouring claims
        // stay separate and only an exact span repeat passes the check.
        let mut claimed: RangeMap<usize, usize> = RangeMap::new();
        let mut touched = false;
        for action in ordered {
            let span = action.target.span;
            if span.end > span.start {
                let range = span.start..span.end;
                let conflicting = claimed.overlapping(&range).any(|(r, _)| *r != range);
                if conflicting {
                    warn!("span {span} of '{}' overlaps an earlier claim", action.target.name);
                    records.push(ModificationRecord::skipped(action, "stale span"));
                    continue;
                }
                claimed.insert(range, span.start);
            }
            let (patched, record) = apply(&contents, action);
            if record.applied && patched != contents {
                contents = patched;
                touched = true;
            }
            records.push(record);
        }

        if touched {
            fs::write(path, &contents)?;
        }
        Ok(())
    }

    fn recommendations(&self, ledger: &Ledger) -> Vec<String> {
        let Some(advisor) = &self.advisor else {
            return vec![];
        };
        let mut notes = vec![];
        for (category, count) in ledger.by_category() {
            if count.applied == 0 {
                continue;
            }
            match advisor.advise(&category) {
                Ok(note) => notes.push(note),
                Err(err) => warn!("no advisory for {category}: {err}"),
            }
        }
        notes
    }
}

/// Unpacks `archive`, patches the extracted tree, repacks and optionally
/// signs it. A signer failure leaves the archive unsigned but does not
/// fail the run; `signed` in the report says what happened.
pub fn process_archive(
    archive: &Path,
    tooling: &dyn ArchiveTooling,
    signer: Option<&dyn ApkSigner>,
    advisor: Option<Box<dyn AdvisoryOracle + Send + Sync>>,
    rules: RuleSet,
) -> Result<RunReport, RunError> {
    info!("unpacking {}", archive.display());
    let tree = tooling.unpack(archive).map_err(|err| RunError::Unpack(err.to_string()))?;

    let mut run = PatchRun::new(rules);
    if let Some(advisor) = advisor {
        run = run.with_advisor(advisor);
    }
    let mut report = run.execute(&tree)?;

    info!("repacking {}", tree.display());
    let rebuilt = tooling.repack(&tree).map_err(|err| RunError::Repack(err.to_string()))?;

    report.signed = match signer {
        Some(signer) => match signer.sign(&rebuilt) {
            Ok(()) => {
                info!("signed {}", rebuilt.display());
                Some(true)
            }
            Err(err) => {
                warn!("signing failed, archive left unsigned: {err}");
                Some(false)
            }
        },
        None => None,
    };
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn run_states_render_lowercase() {
        assert_eq!(RunState::Idle.to_str(), "idle");
        assert_eq!(RunState::Patching.to_str(), "patching");
        assert_eq!(format!("{}", RunState::Finalized), "finalized");
    }

    #[test]
    fn new_runs_start_idle() {
        let run = PatchRun::new(RuleSet::default());
        assert_eq!(run.state(), RunState::Idle);
        assert!(!run.cancel_token().is_cancelled());
    }

    #[test]
    fn run_errors_name_their_stage() {
        assert!(RunError::Unpack("apktool exit 1".to_string())
            .to_string()
            .starts_with("unpack failed"));
        assert!(RunError::Repack("missing tree".to_string())
            .to_string()
            .starts_with("repack failed"));
    }
}
