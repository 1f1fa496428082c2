/* Patch synthesis: decide the outcome a classified method is forced to
   return and build the replacement body. Pure functions of their inputs -
   identical (record, rule) pairs always produce identical actions. */

use crate::patch_ops::{PatchOp, Reg, const_load, const_load_wide};
use crate::rules::{CategoryRule, PatchPolicy};
use crate::types::{DesiredOutcome, MethodFlags, MethodRecord, PatchAction, ReturnKind};
use once_cell::sync::Lazy;
use std::fmt;

/// A method/category pairing that cannot be patched; the reason lands in
/// the ledger as a skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisError {
    pub reason: String,
}

impl SynthesisError {
    pub fn new(reason: &str) -> SynthesisError {
        SynthesisError {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for SynthesisError {}

/// Names where `true` means "threat detected"; these force `false`. This
/// list wins over the affirmative one, so `checkRootDetected` still forces
/// `false` despite containing "check".
static DETECTION_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "isrooted",
        "rooted",
        "jailbroken",
        "isdebug",
        "debuggable",
        "emulator",
        "tampered",
        "hooked",
        "detect",
        "suspicious",
    ]
});

/// Names where `true` means "check passed"; these force `true`.
static AFFIRMATIVE_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "isauthorized",
        "isvalid",
        "ispremium",
        "ispurchased",
        "isauthenticated",
        "islicensed",
        "verify",
        "check",
        "trusted",
    ]
});

/// Boolean polarity for a security-check name. Names matching neither list
/// are treated as detectors and forced `false`.
fn forced_boolean(name: &str) -> bool {
    let name = name.to_lowercase();
    if DETECTION_KEYWORDS.iter().any(|k| name.contains(k)) {
        return false;
    }
    AFFIRMATIVE_KEYWORDS.iter().any(|k| name.contains(k))
}

/// Plans the patch for `record` under `rule`.
///
/// Methods without a patchable body (abstract, native) fail here, as do
/// policy/return-kind pairings with no sensible encoding. Void methods
/// always come back as a no-op action; the applicator turns that into the
/// "void method" ledger skip.
pub fn synthesize(record: &MethodRecord, rule: &CategoryRule) -> Result<PatchAction, SynthesisError> {
    if record.flags.contains(MethodFlags::ABSTRACT) {
        return Err(SynthesisError::new("abstract method"));
    }
    if record.flags.contains(MethodFlags::NATIVE) {
        return Err(SynthesisError::new("native method"));
    }
    if record.return_kind == ReturnKind::Void {
        return Ok(action(record, rule, DesiredOutcome::NoOp));
    }

    let outcome = match rule.policy {
        PatchPolicy::SecurityCheck => match record.return_kind {
            ReturnKind::Boolean => DesiredOutcome::ForceBoolean(forced_boolean(&record.name)),
            ReturnKind::Integer | ReturnKind::WideInteger => DesiredOutcome::ForceInteger(0),
            ReturnKind::ObjectReference => DesiredOutcome::ForceReferenceEmpty,
            kind => {
                return Err(SynthesisError::new(&format!(
                    "unsupported return kind {kind} for a security check"
                )));
            }
        },
        PatchPolicy::Entitlement => match record.return_kind {
            ReturnKind::Boolean => DesiredOutcome::ForceBoolean(true),
            ReturnKind::Integer => DesiredOutcome::ForceInteger(i32::MAX as i64),
            ReturnKind::WideInteger => DesiredOutcome::ForceInteger(i64::MAX),
            kind => {
                return Err(SynthesisError::new(&format!(
                    "unsupported return kind {kind} for an entitlement"
                )));
            }
        },
        PatchPolicy::Fixed(outcome) => outcome,
    };

    if !outcome.fits(record.return_kind) {
        return Err(SynthesisError::new(&format!(
            "outcome '{outcome}' does not fit return kind {}",
            record.return_kind
        )));
    }
    if let DesiredOutcome::ForceInteger(value) = outcome {
        if record.return_kind == ReturnKind::Integer && i32::try_from(value).is_err() {
            return Err(SynthesisError::new(&format!(
                "literal {value} does not fit a 32-bit return"
            )));
        }
    }

    Ok(action(record, rule, outcome))
}

fn action(record: &MethodRecord, rule: &CategoryRule, outcome: DesiredOutcome) -> PatchAction {
    PatchAction {
        target: record.clone(),
        category: rule.category.clone(),
        desired_outcome: outcome,
        body: body_lines(record, outcome),
    }
}

/// Replacement interior: a register budget, one constant load and the
/// return matching the declared kind, indented four spaces. No-op outcomes
/// have no body.
fn body_lines(record: &MethodRecord, outcome: DesiredOutcome) -> Vec<String> {
    let dest = Reg(0);
    let ops = match outcome {
        DesiredOutcome::NoOp => return vec![],
        DesiredOutcome::ForceBoolean(value) => vec![
            PatchOp::Locals(locals_budget(record, 1)),
            const_load(dest, value as i32),
            PatchOp::Return { src: dest },
        ],
        DesiredOutcome::ForceInteger(value) => match record.return_kind {
            ReturnKind::WideInteger => vec![
                PatchOp::Locals(locals_budget(record, 2)),
                const_load_wide(dest, value),
                PatchOp::ReturnWide { src: dest },
            ],
            // Range-checked in synthesize; a 32-bit return never sees a
            // literal beyond i32.
            _ => vec![
                PatchOp::Locals(locals_budget(record, 1)),
                const_load(dest, value as i32),
                PatchOp::Return { src: dest },
            ],
        },
        DesiredOutcome::ForceReferenceEmpty => vec![
            PatchOp::Locals(locals_budget(record, 1)),
            const_load(dest, 0),
            PatchOp::ReturnObject { src: dest },
        ],
    };
    ops.iter().map(|op| format!("    {op}")).collect()
}

/// Never shrink a declared register budget; annotations or debug info may
/// still reference the higher registers.
fn locals_budget(record: &MethodRecord, minimum: u32) -> u32 {
    record.locals.map_or(minimum, |n| n.max(minimum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Span;
    use std::path::PathBuf;

    fn record(name: &str, kind: ReturnKind) -> MethodRecord {
        MethodRecord {
            class_name: "Lcom/example/Checks;".to_string(),
            name: name.to_string(),
            signature_line: format!(".method public {name}()Z"),
            return_kind: kind,
            source_file: PathBuf::from("checks.smali"),
            span: Span::new(0, 5),
            flags: MethodFlags::PUBLIC,
            locals: Some(1),
        }
    }

    fn security() -> CategoryRule {
        CategoryRule::new("root-detection", &["isrooted"], PatchPolicy::SecurityCheck)
    }

    fn entitlement() -> CategoryRule {
        CategoryRule::new("entitlement", &["ispremium"], PatchPolicy::Entitlement)
    }

    #[test]
    fn synthesis_is_deterministic() {
        let r = record("isRooted", ReturnKind::Boolean);
        let a = synthesize(&r, &security()).unwrap();
        let b = synthesize(&r, &security()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn detection_names_force_false() {
        for name in ["isRooted", "isJailbroken", "isDebuggable", "detectHooks"] {
            let action = synthesize(&record(name, ReturnKind::Boolean), &security()).unwrap();
            assert_eq!(action.desired_outcome, DesiredOutcome::ForceBoolean(false), "{name}");
        }
    }

    #[test]
    fn affirmative_names_force_true() {
        for name in ["isValidSignature", "isAuthorized", "verifyPurchase"] {
            let action = synthesize(&record(name, ReturnKind::Boolean), &security()).unwrap();
            assert_eq!(action.desired_outcome, DesiredOutcome::ForceBoolean(true), "{name}");
        }
    }

    #[test]
    fn detection_list_wins_over_affirmative() {
        let action = synthesize(&record("checkRootDetected", ReturnKind::Boolean), &security()).unwrap();
        assert_eq!(action.desired_outcome, DesiredOutcome::ForceBoolean(false));
    }

    #[test]
    fn unmatched_polarity_defaults_to_false() {
        let action = synthesize(&record("a8f3c", ReturnKind::Boolean), &security()).unwrap();
        assert_eq!(action.desired_outcome, DesiredOutcome::ForceBoolean(false));
    }

    #[test]
    fn security_counters_force_zero() {
        let action = synthesize(&record("isRootedCount", ReturnKind::Integer), &security()).unwrap();
        assert_eq!(action.desired_outcome, DesiredOutcome::ForceInteger(0));
        let action = synthesize(&record("isRootedNanos", ReturnKind::WideInteger), &security()).unwrap();
        assert_eq!(action.desired_outcome, DesiredOutcome::ForceInteger(0));
    }

    #[test]
    fn security_reference_returns_are_nulled() {
        let action =
            synthesize(&record("getAcceptedIssuers", ReturnKind::ObjectReference), &security()).unwrap();
        assert_eq!(action.desired_outcome, DesiredOutcome::ForceReferenceEmpty);
        assert_eq!(action.body, vec!["    .locals 1", "    const/4 v0, 0x0", "    return-object v0"]);
    }

    #[test]
    fn entitlement_booleans_force_true() {
        let action = synthesize(&record("isPremium", ReturnKind::Boolean), &entitlement()).unwrap();
        assert_eq!(action.desired_outcome, DesiredOutcome::ForceBoolean(true));
        assert_eq!(action.body, vec!["    .locals 1", "    const/4 v0, 0x1", "    return v0"]);
    }

    #[test]
    fn entitlement_numerics_force_the_maximum() {
        let action = synthesize(&record("getCredits", ReturnKind::Integer), &entitlement()).unwrap();
        assert_eq!(action.desired_outcome, DesiredOutcome::ForceInteger(i32::MAX as i64));
        let action = synthesize(&record("getCredits", ReturnKind::WideInteger), &entitlement()).unwrap();
        assert_eq!(action.desired_outcome, DesiredOutcome::ForceInteger(i64::MAX));
        assert_eq!(
            action.body,
            vec![
                "    .locals 2",
                "    const-wide v0, 0x7fffffffffffffff",
                "    return-wide v0"
            ]
        );
    }

    #[test]
    fn entitlement_references_are_a_classification_error() {
        let err = synthesize(&record("getPremiumBadge", ReturnKind::ObjectReference), &entitlement())
            .unwrap_err();
        assert!(err.reason.contains("object-reference"));
    }

    #[test]
    fn float_returns_cannot_be_forced() {
        assert!(synthesize(&record("isRootedScore", ReturnKind::Float), &security()).is_err());
        assert!(synthesize(&record("getBalance", ReturnKind::Double), &entitlement()).is_err());
    }

    #[test]
    fn void_methods_become_noop_actions() {
        let action = synthesize(&record("checkRoot", ReturnKind::Void), &security()).unwrap();
        assert_eq!(action.desired_outcome, DesiredOutcome::NoOp);
        assert!(action.body.is_empty());
    }

    #[test]
    fn bodiless_declarations_are_refused() {
        let mut r = record("isRooted", ReturnKind::Boolean);
        r.flags = MethodFlags::PUBLIC | MethodFlags::ABSTRACT;
        assert_eq!(synthesize(&r, &security()).unwrap_err().reason, "abstract method");
        r.flags = MethodFlags::PUBLIC | MethodFlags::NATIVE;
        assert_eq!(synthesize(&r, &security()).unwrap_err().reason, "native method");
    }

    #[test]
    fn fixed_outcomes_are_validated_against_the_return_kind() {
        let pinned = CategoryRule::new(
            "custom",
            &["thing"],
            PatchPolicy::Fixed(DesiredOutcome::ForceBoolean(true)),
        );
        assert!(synthesize(&record("getThing", ReturnKind::Boolean), &pinned).is_ok());
        assert!(synthesize(&record("getThing", ReturnKind::Integer), &pinned).is_err());
    }

    #[test]
    fn oversized_fixed_literal_is_refused_for_narrow_returns() {
        let pinned = CategoryRule::new(
            "custom",
            &["thing"],
            PatchPolicy::Fixed(DesiredOutcome::ForceInteger(i64::MAX)),
        );
        assert!(synthesize(&record("getThing", ReturnKind::Integer), &pinned).is_err());
        assert!(synthesize(&record("getThing", ReturnKind::WideInteger), &pinned).is_ok());
    }

    #[test]
    fn original_register_budget_is_never_shrunk() {
        let mut r = record("isRooted", ReturnKind::Boolean);
        r.locals = Some(5);
        let action = synthesize(&r, &security()).unwrap();
        assert_eq!(action.body[0], "    .locals 5");

        r.locals = None;
        let action = synthesize(&r, &security()).unwrap();
        assert_eq!(action.body[0], "    .locals 1");

        r.locals = Some(0);
        r.return_kind = ReturnKind::WideInteger;
        let action = synthesize(&r, &security()).unwrap();
        assert_eq!(action.body[0], "    .locals 2");
    }

    #[test]
    fn forced_false_body_decodes_back_to_zero() {
        let action = synthesize(&record("isRooted", ReturnKind::Boolean), &security()).unwrap();
        assert_eq!(
            action.body,
            vec!["    .locals 1", "    const/4 v0, 0x0", "    return v0"]
        );
        let (reg, literal) = crate::patch_ops::read_const_line(&action.body[1]).unwrap();
        assert_eq!(reg, Reg(0));
        assert_eq!(literal, 0);
    }
}
