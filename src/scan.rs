/* Line-oriented scanner for disassembled listings. A tolerant two-state
   machine (outside a method / inside a method) over a single linear pass:
   no backtracking, and anything unreadable is dropped rather than raised. */

use crate::types::{MethodFlags, MethodRecord, ReturnKind, Span};
use log::warn;
use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, digit1, space0};
use nom::sequence::delimited;
use std::path::{Path, PathBuf};
use std::str::Split;

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(space0, inner, space0)
}

/// Class-declaration line; the class name is the final whitespace-delimited
/// token, after any modifier words.
fn parse_class_line(line: &str) -> IResult<&str, &str> {
    let (rest, _) = ws(tag(".class"))(line)?;
    let (rest, body) = take_while(|c| c != '#')(rest)?;
    match body.split_whitespace().last() {
        Some(name) => Ok((rest, name)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            rest,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

/// Method-declaration line. Everything before `(` is modifier words followed
/// by the name; the text after the matching `)` is the return descriptor.
/// Succeeds whenever the line has the declaration shape, even if the name or
/// descriptor turn out unusable - the caller decides what to drop.
fn parse_method_line(line: &str) -> IResult<&str, (MethodFlags, String, Option<ReturnKind>)> {
    let (rest, _) = ws(tag(".method"))(line)?;
    let (rest, words) = take_while(|c| c != '(')(rest)?;
    let (rest, _) = char('(')(rest)?;
    let (rest, _) = take_while(|c| c != ')')(rest)?;
    let (rest, _) = char(')')(rest)?;

    let mut flags = MethodFlags::empty();
    let mut tokens = words.split_whitespace().peekable();
    while let Some(word) = tokens.peek() {
        match MethodFlags::from_word(word) {
            Some(flag) => {
                flags |= flag;
                tokens.next();
            }
            None => break,
        }
    }
    let name = tokens.last().unwrap_or("").to_string();
    let return_kind = ReturnKind::from_descriptor(rest);

    Ok((rest, (flags, name, return_kind)))
}

fn parse_end_method_line(line: &str) -> IResult<&str, ()> {
    let (rest, _) = ws(tag(".end method"))(line)?;
    Ok((rest, ()))
}

/// `.locals N` or `.registers N` register budget directive.
fn parse_locals_line(line: &str) -> IResult<&str, u32> {
    let (rest, _) = ws(alt((tag(".locals"), tag(".registers"))))(line)?;
    let (rest, digits) = digit1(rest)?;
    match digits.parse::<u32>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            rest,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

struct OpenMethod {
    class_name: String,
    name: String,
    signature_line: String,
    return_kind: ReturnKind,
    flags: MethodFlags,
    locals: Option<u32>,
    start: usize,
}

impl OpenMethod {
    fn into_record(self, end: usize, source: &Path) -> MethodRecord {
        MethodRecord {
            class_name: self.class_name,
            name: self.name,
            signature_line: self.signature_line,
            return_kind: self.return_kind,
            source_file: source.to_path_buf(),
            span: Span::new(self.start, end),
            flags: self.flags,
            locals: self.locals,
        }
    }
}

/// Lazy scanner over one listing's text, yielding a [`MethodRecord`] per
/// completed method. Single forward pass; a method still open at end of
/// input is discarded.
///
/// Lines are split on `\n` with any trailing `\r` kept, so records re-match
/// CRLF files byte for byte.
///
/// # Examples
///
/// ```
///  use smalipatch::scan::MethodScan;
///  use std::path::Path;
///
///  let listing = ".method public isRooted()Z\n    .locals 1\n    const/4 v0, 0x1\n    return v0\n.end method\n";
///  let records: Vec<_> = MethodScan::new(listing, Path::new("a.smali")).collect();
///  assert_eq!(records.len(), 1);
///  assert_eq!(records[0].name, "isRooted");
/// ```
pub struct MethodScan<'a> {
    lines: Split<'a, char>,
    line_no: usize,
    source: PathBuf,
    current_class: String,
    open: Option<OpenMethod>,
}

impl<'a> MethodScan<'a> {
    pub fn new(contents: &'a str, source: &Path) -> MethodScan<'a> {
        MethodScan {
            lines: contents.split('\n'),
            line_no: 0,
            source: source.to_path_buf(),
            current_class: String::new(),
            open: None,
        }
    }

    /// Opens a method scope when the declaration carries a usable name and
    /// return descriptor; malformed declarations are dropped silently.
    fn open_method(
        &mut self,
        line: &str,
        idx: usize,
        flags: MethodFlags,
        name: String,
        return_kind: Option<ReturnKind>,
    ) {
        if name.is_empty() {
            return;
        }
        let Some(return_kind) = return_kind else {
            return;
        };
        self.open = Some(OpenMethod {
            class_name: self.current_class.clone(),
            name,
            signature_line: line.to_string(),
            return_kind,
            flags,
            locals: None,
            start: idx,
        });
    }
}

impl<'a> Iterator for MethodScan<'a> {
    type Item = MethodRecord;

    fn next(&mut self) -> Option<MethodRecord> {
        loop {
            // End of input: an unterminated method is dropped, not emitted.
            let line = self.lines.next()?;
            let idx = self.line_no;
            self.line_no += 1;

            if let Ok((_, name)) = parse_class_line(line) {
                // Class lines inside a body never reset the class context.
                if self.open.is_none() {
                    self.current_class = name.to_string();
                }
                continue;
            }

            if parse_end_method_line(line).is_ok() {
                // Orphan terminators are ignored.
                if let Some(open) = self.open.take() {
                    return Some(open.into_record(idx + 1, &self.source));
                }
                continue;
            }

            if let Ok((_, (flags, name, return_kind))) = parse_method_line(line) {
                if let Some(open) = self.open.take() {
                    // A declaration inside an open method means the previous
                    // terminator was lost; close at this line rather than
                    // merging the two declarations.
                    warn!(
                        "declaration at line {} interrupts open method '{}' in {}",
                        idx,
                        open.name,
                        self.source.display()
                    );
                    let record = open.into_record(idx, &self.source);
                    self.open_method(line, idx, flags, name, return_kind);
                    return Some(record);
                }
                self.open_method(line, idx, flags, name, return_kind);
                continue;
            }

            if let Ok((_, budget)) = parse_locals_line(line) {
                if let Some(open) = self.open.as_mut() {
                    if open.locals.is_none() {
                        open.locals = Some(budget);
                    }
                }
                continue;
            }

            // Blank lines, comments and instructions carry no state.
        }
    }
}

/// Collects every method in one listing, attributed to `source`.
pub fn scan_listing(contents: &str, source: &Path) -> Vec<MethodRecord> {
    MethodScan::new(contents, source).collect()
}
