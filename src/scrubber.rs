//! Output canonicalization for stable, platform-independent hashing.
//!
//! Program output captured inside a sandbox may carry Windows line endings
//! or an inconsistent trailing newline depending on the language runtime.
//! Both the worker agent (before hashing its captured output) and the
//! grading pipeline (before hashing the expected output) canonicalize
//! through [`scrub`] so the two SHA-256 digests are comparable.

/// Canonicalizes line endings and the trailing newline of captured output.
///
/// Splits on LF, strips one trailing CR from each line, drops a final empty
/// line if present, rejoins with LF, and appends exactly one terminating LF.
///
/// The function is idempotent: `scrub(scrub(x)) == scrub(x)`.
#[must_use]
pub fn scrub(data: &[u8]) -> Vec<u8> {
    let mut lines: Vec<&[u8]> = data
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();

    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    let mut out = lines.join(&b'\n');
    out.push(b'\n');
    out
}
