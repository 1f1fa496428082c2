/* Span-validated splicing of synthesized bodies into listing text. Fails
   closed: any mismatch between the recorded span and the live content
   leaves the text untouched and reports a "stale span" skip. */

use crate::types::{DesiredOutcome, ModificationRecord, PatchAction};
use log::warn;

/// Rewrites the interior of `action.target` inside `contents`.
///
/// Only the lines strictly between the declaration and the terminator are
/// replaced; both boundary lines and everything outside the span come back
/// byte-identical. Re-applying the same action to already-patched content
/// is a no-op that still reports `applied = true`.
pub fn apply(contents: &str, action: &PatchAction) -> (String, ModificationRecord) {
    if action.desired_outcome == DesiredOutcome::NoOp {
        // Nothing meaningful to force in a void body.
        return (contents.to_string(), ModificationRecord::skipped(action, "void method"));
    }

    let lines: Vec<&str> = contents.split('\n').collect();
    let span = action.target.span;

    if span.is_empty() || span.start >= lines.len() {
        warn!("span {} outside {} line file", span, lines.len());
        return stale(contents, action);
    }
    if lines[span.start] != action.target.signature_line {
        warn!(
            "declaration drifted at line {} of {}",
            span.start,
            action.target.source_file.display()
        );
        return stale(contents, action);
    }

    // Locate the terminator from the declaration onward. Hitting another
    // declaration first means the recorded method never closed; there is no
    // safe interior to splice.
    let mut terminator = None;
    for (idx, line) in lines.iter().enumerate().skip(span.start + 1) {
        let trimmed = line.trim_start();
        if trimmed.starts_with(".end method") {
            terminator = Some(idx);
            break;
        }
        if trimmed.starts_with(".method") {
            break;
        }
    }
    let Some(terminator) = terminator else {
        warn!(
            "no terminator found for '{}' in {}",
            action.target.name,
            action.target.source_file.display()
        );
        return stale(contents, action);
    };

    // Inserted lines adopt the declaration line's ending.
    let crlf = lines[span.start].ends_with('\r');
    let replacement: Vec<String> = action
        .body
        .iter()
        .map(|line| if crlf { format!("{line}\r") } else { line.clone() })
        .collect();

    let interior = &lines[span.start + 1..terminator];
    if interior.len() == replacement.len()
        && interior.iter().zip(&replacement).all(|(a, b)| *a == b)
    {
        // Already carrying this exact body.
        return (contents.to_string(), ModificationRecord::applied(action));
    }

    // Fresh content puts the terminator exactly where the scan recorded it;
    // anywhere else means the file changed since parse.
    if terminator != span.end - 1 {
        warn!(
            "terminator moved from line {} to {} for '{}'",
            span.end - 1,
            terminator,
            action.target.name
        );
        return stale(contents, action);
    }

    let mut patched = String::with_capacity(contents.len() + 64);
    for line in &lines[..=span.start] {
        patched.push_str(line);
        patched.push('\n');
    }
    for line in &replacement {
        patched.push_str(line);
        patched.push('\n');
    }
    for (offset, line) in lines[terminator..].iter().enumerate() {
        patched.push_str(line);
        if terminator + offset + 1 < lines.len() {
            patched.push('\n');
        }
    }

    (patched, ModificationRecord::applied(action))
}

fn stale(contents: &str, action: &PatchAction) -> (String, ModificationRecord) {
    (contents.to_string(), ModificationRecord::skipped(action, "stale span"))
}
