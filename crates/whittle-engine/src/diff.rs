//! Minimal unified-style diff for `--print-diff` output.

use std::fmt::Write;

/// Render the changed region of one file as a unified-style diff.
///
/// Common leading and trailing lines are trimmed; what remains is printed
/// as one removal/addition hunk. Good enough to eyeball a transformation,
/// not a general diff.
pub fn render(name: &str, old: &[u8], new: &[u8]) -> String {
    let old_text = String::from_utf8_lossy(old);
    let new_text = String::from_utf8_lossy(new);
    let old_lines: Vec<&str> = old_text.lines().collect();
    let new_lines: Vec<&str> = new_text.lines().collect();

    let max_common = old_lines.len().min(new_lines.len());
    let mut prefix = 0;
    while prefix < max_common && old_lines[prefix] == new_lines[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < max_common - prefix
        && old_lines[old_lines.len() - 1 - suffix] == new_lines[new_lines.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let removed = &old_lines[prefix..old_lines.len() - suffix];
    let added = &new_lines[prefix..new_lines.len() - suffix];

    let mut out = String::new();
    let _ = writeln!(out, "--- {}", name);
    let _ = writeln!(out, "+++ {}", name);
    let _ = writeln!(
        out,
        "@@ -{},{} +{},{} @@",
        prefix + 1,
        removed.len(),
        prefix + 1,
        added.len()
    );
    for line in removed {
        let _ = writeln!(out, "-{}", line);
    }
    for line in added {
        let _ = writeln!(out, "+{}", line);
    }
    out
}
