/* Core data model: method records produced by the listing scanner and the
   patch/ledger types built from them. */

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Return kind of a method, inferred from the trailing type descriptor of
/// its declaration line.
///
/// # Examples
///
/// ```
///  use smalipatch::types::ReturnKind;
///
///  assert_eq!(ReturnKind::from_descriptor("Z"), Some(ReturnKind::Boolean));
///  assert_eq!(ReturnKind::from_descriptor("Ljava/lang/String;"), Some(ReturnKind::ObjectReference));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnKind {
    Boolean,
    Integer,
    WideInteger,
    Float,
    Double,
    ObjectReference,
    Void,
}

impl ReturnKind {
    /// Maps a descriptor to its kind: `Z` boolean; `I`, `S`, `B` and `C`
    /// integer; `J` wide integer; `F`/`D` float/double; `L...;` and array
    /// descriptors object references; `V` void.
    pub fn from_descriptor(descriptor: &str) -> Option<ReturnKind> {
        match descriptor.trim().chars().next()? {
            'Z' => Some(ReturnKind::Boolean),
            'I' | 'S' | 'B' | 'C' => Some(ReturnKind::Integer),
            'J' => Some(ReturnKind::WideInteger),
            'F' => Some(ReturnKind::Float),
            'D' => Some(ReturnKind::Double),
            'L' | '[' => Some(ReturnKind::ObjectReference),
            'V' => Some(ReturnKind::Void),
            _ => None,
        }
    }

    pub fn to_str(&self) -> &str {
        match self {
            ReturnKind::Boolean => "boolean",
            ReturnKind::Integer => "integer",
            ReturnKind::WideInteger => "wide-integer",
            ReturnKind::Float => "float",
            ReturnKind::Double => "double",
            ReturnKind::ObjectReference => "object-reference",
            ReturnKind::Void => "void",
        }
    }
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

bitflags! {
    /// Access-flag words collected from a method declaration line. Values
    /// follow the dex access-flag encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const BRIDGE = 0x40;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

impl MethodFlags {
    /// Parses a single modifier word from a declaration line. Unknown words
    /// are not flags; in a declaration they belong to the method name.
    pub fn from_word(word: &str) -> Option<MethodFlags> {
        Some(match word {
            "public" => MethodFlags::PUBLIC,
            "private" => MethodFlags::PRIVATE,
            "protected" => MethodFlags::PROTECTED,
            "static" => MethodFlags::STATIC,
            "final" => MethodFlags::FINAL,
            "synchronized" => MethodFlags::SYNCHRONIZED,
            "bridge" => MethodFlags::BRIDGE,
            "varargs" => MethodFlags::VARARGS,
            "native" => MethodFlags::NATIVE,
            "abstract" => MethodFlags::ABSTRACT,
            "strictfp" => MethodFlags::STRICT,
            "synthetic" => MethodFlags::SYNTHETIC,
            "constructor" => MethodFlags::CONSTRUCTOR,
            "declared-synchronized" => MethodFlags::DECLARED_SYNCHRONIZED,
            _ => return None,
        })
    }
}

/// Half-open line range `[start, end)` bounding a method within a listing
/// file: `start` is the declaration line, `end` the line after the
/// terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }

    /// Number of lines covered, declaration and terminator included.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A method located in a listing file, with enough context to re-find and
/// rewrite it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    /// Fully qualified type name of the declaring class, as written in the
    /// listing's class line. Empty when the listing carries no class line.
    pub class_name: String,
    /// Method identifier exactly as written, synthetic characters included.
    pub name: String,
    /// The raw declaration line, byte-for-byte; used to re-match the span
    /// before rewriting.
    pub signature_line: String,
    pub return_kind: ReturnKind,
    /// Listing file the method was found in.
    pub source_file: PathBuf,
    pub span: Span,
    pub flags: MethodFlags,
    /// Register budget from a `.locals`/`.registers` directive in the body,
    /// when one was seen.
    pub locals: Option<u32>,
}

/// Outcome of rule matching for one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub method: MethodRecord,
    /// Matched category labels in rule-table order; empty when nothing
    /// matched.
    pub categories: Vec<String>,
}

impl ClassificationResult {
    pub fn is_match(&self) -> bool {
        !self.categories.is_empty()
    }
}

/// What a synthesized patch forces the method to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesiredOutcome {
    ForceBoolean(bool),
    ForceInteger(i64),
    ForceReferenceEmpty,
    NoOp,
}

impl DesiredOutcome {
    /// Whether this outcome can be encoded for a method of the given return
    /// kind.
    ///
    /// # Examples
    ///
    /// ```
    ///  use smalipatch::types::{DesiredOutcome, ReturnKind};
    ///
    ///  assert!(DesiredOutcome::ForceBoolean(true).fits(ReturnKind::Boolean));
    ///  assert!(!DesiredOutcome::ForceBoolean(true).fits(ReturnKind::Void));
    /// ```
    pub fn fits(&self, kind: ReturnKind) -> bool {
        match self {
            DesiredOutcome::ForceBoolean(_) => kind == ReturnKind::Boolean,
            DesiredOutcome::ForceInteger(_) => {
                matches!(kind, ReturnKind::Integer | ReturnKind::WideInteger)
            }
            DesiredOutcome::ForceReferenceEmpty => kind == ReturnKind::ObjectReference,
            DesiredOutcome::NoOp => kind == ReturnKind::Void,
        }
    }
}

impl fmt::Display for DesiredOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DesiredOutcome::ForceBoolean(value) => write!(f, "force {value}"),
            DesiredOutcome::ForceInteger(value) => write!(f, "force {value}"),
            DesiredOutcome::ForceReferenceEmpty => write!(f, "force null"),
            DesiredOutcome::NoOp => write!(f, "no-op"),
        }
    }
}

/// A planned rewrite of one method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchAction {
    pub target: MethodRecord,
    /// Category whose rule produced this action; carried into the ledger.
    pub category: String,
    pub desired_outcome: DesiredOutcome,
    /// Replacement interior lines, without line endings. Empty for no-op
    /// outcomes.
    pub body: Vec<String>,
}

/// One ledger entry: a single patch attempt and its outcome. Immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationRecord {
    pub file: PathBuf,
    pub class_name: String,
    pub method_name: String,
    pub category: String,
    /// Outcome the patch forces; `None` when synthesis never produced one.
    pub outcome: Option<DesiredOutcome>,
    pub applied: bool,
    pub reason_if_skipped: Option<String>,
}

impl ModificationRecord {
    pub fn applied(action: &PatchAction) -> ModificationRecord {
        ModificationRecord {
            file: action.target.source_file.clone(),
            class_name: action.target.class_name.clone(),
            method_name: action.target.name.clone(),
            category: action.category.clone(),
            outcome: Some(action.desired_outcome),
            applied: true,
            reason_if_skipped: None,
        }
    }

    pub fn skipped(action: &PatchAction, reason: &str) -> ModificationRecord {
        ModificationRecord {
            file: action.target.source_file.clone(),
            class_name: action.target.class_name.clone(),
            method_name: action.target.name.clone(),
            category: action.category.clone(),
            outcome: Some(action.desired_outcome),
            applied: false,
            reason_if_skipped: Some(reason.to_string()),
        }
    }

    /// Skip entry for a method that never reached the applicator, e.g. a
    /// synthesis failure.
    pub fn skipped_method(method: &MethodRecord, category: &str, reason: &str) -> ModificationRecord {
        ModificationRecord {
            file: method.source_file.clone(),
            class_name: method.class_name.clone(),
            method_name: method.name.clone(),
            category: category.to_string(),
            outcome: None,
            applied: false,
            reason_if_skipped: Some(reason.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_table() {
        assert_eq!(ReturnKind::from_descriptor("Z"), Some(ReturnKind::Boolean));
        assert_eq!(ReturnKind::from_descriptor("I"), Some(ReturnKind::Integer));
        assert_eq!(ReturnKind::from_descriptor("S"), Some(ReturnKind::Integer));
        assert_eq!(ReturnKind::from_descriptor("B"), Some(ReturnKind::Integer));
        assert_eq!(ReturnKind::from_descriptor("C"), Some(ReturnKind::Integer));
        assert_eq!(ReturnKind::from_descriptor("J"), Some(ReturnKind::WideInteger));
        assert_eq!(ReturnKind::from_descriptor("F"), Some(ReturnKind::Float));
        assert_eq!(ReturnKind::from_descriptor("D"), Some(ReturnKind::Double));
        assert_eq!(ReturnKind::from_descriptor("V"), Some(ReturnKind::Void));
        assert_eq!(
            ReturnKind::from_descriptor("Ljava/lang/String;"),
            Some(ReturnKind::ObjectReference)
        );
        assert_eq!(ReturnKind::from_descriptor("[B"), Some(ReturnKind::ObjectReference));
        assert_eq!(ReturnKind::from_descriptor(""), None);
        assert_eq!(ReturnKind::from_descriptor("Q"), None);
    }

    #[test]
    fn modifier_words() {
        assert_eq!(MethodFlags::from_word("public"), Some(MethodFlags::PUBLIC));
        assert_eq!(MethodFlags::from_word("abstract"), Some(MethodFlags::ABSTRACT));
        assert_eq!(
            MethodFlags::from_word("declared-synchronized"),
            Some(MethodFlags::DECLARED_SYNCHRONIZED)
        );
        assert_eq!(MethodFlags::from_word("isRooted"), None);
    }

    #[test]
    fn outcome_compatibility() {
        assert!(DesiredOutcome::ForceInteger(7).fits(ReturnKind::Integer));
        assert!(DesiredOutcome::ForceInteger(7).fits(ReturnKind::WideInteger));
        assert!(!DesiredOutcome::ForceInteger(7).fits(ReturnKind::Boolean));
        assert!(DesiredOutcome::ForceReferenceEmpty.fits(ReturnKind::ObjectReference));
        assert!(!DesiredOutcome::ForceReferenceEmpty.fits(ReturnKind::Integer));
        assert!(DesiredOutcome::NoOp.fits(ReturnKind::Void));
        assert!(!DesiredOutcome::NoOp.fits(ReturnKind::Boolean));
    }

    #[test]
    fn span_display() {
        let s = Span::new(3, 9);
        assert_eq!(s.len(), 6);
        assert!(!s.is_empty());
        assert_eq!(format!("{s}"), "[3, 9)");
    }
}
