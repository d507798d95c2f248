//! Whitespace normalization.

/// Trim surrounding whitespace and collapse runs of three or more `\n` into
/// exactly two.
///
/// The result is a fixed point: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(message: &str) -> String {
    let trimmed = message.trim();
    let mut out = String::with_capacity(trimmed.len());
    let mut run = 0usize;

    for ch in trimmed.chars() {
        if ch == '\n' {
            run += 1;
            if run <= 2 {
                out.push(ch);
            }
        } else {
            run = 0;
            out.push(ch);
        }
    }
    out
}
