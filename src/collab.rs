/* Seams for the external tools a patch run drives: archive unpack/repack,
   signing, and the advisory oracle. Implementations shell out or call
   services; the engine only sees these traits. */

use once_cell::sync::Lazy;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum CollabError {
    Io(io::Error),
    /// The external tool ran but reported failure.
    Tool(String),
    /// No implementation can serve this request.
    Unavailable(String),
}

impl fmt::Display for CollabError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CollabError::Io(err) => write!(f, "I/O error: {err}"),
            CollabError::Tool(msg) => write!(f, "tool failure: {msg}"),
            CollabError::Unavailable(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CollabError {}

impl From<io::Error> for CollabError {
    fn from(err: io::Error) -> CollabError {
        CollabError::Io(err)
    }
}

/// Turns an archive into an editable listing tree and back.
pub trait ArchiveTooling {
    /// Extracts `archive` and returns the root of the listing tree.
    fn unpack(&self, archive: &Path) -> Result<PathBuf, CollabError>;

    /// Rebuilds an archive from the tree `unpack` produced and returns the
    /// rebuilt archive's path.
    fn repack(&self, tree: &Path) -> Result<PathBuf, CollabError>;
}

/// Signs a rebuilt archive in place.
pub trait ApkSigner {
    fn sign(&self, archive: &Path) -> Result<(), CollabError>;
}

/// Produces human-readable guidance about a patched category. Advice never
/// feeds back into patch decisions.
pub trait AdvisoryOracle {
    fn advise(&self, snippet: &str) -> Result<String, CollabError>;
}

static ADVICE: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        (
            "root-detection",
            "runtime hiding modules can also defeat this check; verify on a device without them",
        ),
        (
            "debug-detection",
            "the app may still read /proc flags directly; watch for secondary probes",
        ),
        (
            "emulator-detection",
            "build-property probes often accompany this check; expect follow-up reads of Build.FINGERPRINT",
        ),
        (
            "tamper-detection",
            "signature digests may also be verified server-side, where this change has no effect",
        ),
        (
            "certificate-pinning",
            "with pinning disabled, proxy inspection of TLS traffic becomes possible",
        ),
        (
            "license-check",
            "server-issued license tokens are unaffected; offline checks only",
        ),
        (
            "authentication",
            "session tokens minted by the backend still gate real account data",
        ),
        (
            "entitlement",
            "server-validated purchases will still show as absent in account APIs",
        ),
        (
            "billing",
            "store receipts are verified by the billing service; local state only",
        ),
    ]
});

/// Canned per-category guidance, keyed by substring match.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAdvisor;

impl AdvisoryOracle for StaticAdvisor {
    fn advise(&self, snippet: &str) -> Result<String, CollabError> {
        let lowered = snippet.to_lowercase();
        for (category, note) in ADVICE.iter() {
            if lowered.contains(category) {
                return Ok(format!("{category}: {note}"));
            }
        }
        Err(CollabError::Unavailable(format!("no advice for '{snippet}'")))
    }
}
