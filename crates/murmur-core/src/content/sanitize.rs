//! Markup sanitization.
//!
//! Removes every tag and attribute while keeping text content. Elements whose
//! bodies are never meaningful text (scripts, styles, embedded documents) are
//! dropped together with their content, as are HTML comments. Text is not
//! entity-decoded or re-encoded; the output is plain text for a text-only
//! renderer.

/// Elements removed together with everything up to their closing tag.
const DROP_WITH_CONTENT: [&str; 12] = [
    "script", "style", "template", "iframe", "noscript", "noembed", "noframes", "xmp", "title",
    "svg", "math", "head",
];

/// Strip all markup from `input`, keeping text content.
pub fn strip_markup(input: &str) -> String {
    let bytes = input.as_bytes();
    let lower = input.to_ascii_lowercase();
    let mut out = String::with_capacity(input.len());

    let mut i = 0;
    let mut text_start = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' || !opens_markup(bytes.get(i + 1).copied()) {
            i += 1;
            continue;
        }

        out.push_str(&input[text_start..i]);

        if lower[i..].starts_with("<!--") {
            i = match lower[i + 4..].find("-->") {
                Some(p) => i + 4 + p + 3,
                None => bytes.len(),
            };
        } else {
            let end = tag_end(bytes, i + 1);
            i = match opening_tag_name(&lower, i + 1) {
                Some(name) if DROP_WITH_CONTENT.contains(&name) && !self_closing(bytes, end) => {
                    skip_element_body(&lower, end, name)
                }
                _ => end,
            };
        }
        text_start = i;
    }

    if text_start < bytes.len() {
        out.push_str(&input[text_start..]);
    }
    out
}

/// `<` only starts markup when followed by a tag-ish character; `a < b` and
/// `<3` stay text.
fn opens_markup(next: Option<u8>) -> bool {
    matches!(next, Some(c) if c.is_ascii_alphabetic() || c == b'/' || c == b'!' || c == b'?')
}

/// Index just past the `>` closing the tag that starts at `from`, honoring
/// quoted attribute values. An unterminated tag runs to the end of input.
fn tag_end(bytes: &[u8], from: usize) -> usize {
    let mut quote: Option<u8> = None;
    let mut j = from;
    while j < bytes.len() {
        let c = bytes[j];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == b'"' || c == b'\'' => quote = Some(c),
            None if c == b'>' => return j + 1,
            None => {}
        }
        j += 1;
    }
    bytes.len()
}

fn opening_tag_name(lower: &str, from: usize) -> Option<&str> {
    let rest = &lower[from..];
    let len = rest
        .bytes()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == b'-')
        .count();
    if len == 0 {
        return None;
    }
    Some(&rest[..len])
}

fn self_closing(bytes: &[u8], end: usize) -> bool {
    end >= 2 && bytes.get(end - 1) == Some(&b'>') && bytes[end - 2] == b'/'
}

fn skip_element_body(lower: &str, from: usize, name: &str) -> usize {
    let closing = format!("</{name}");
    match lower[from..].find(&closing) {
        Some(p) => tag_end(lower.as_bytes(), from + p + closing.len()),
        None => lower.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_text_of_formatting_tags() {
        assert_eq!(strip_markup("<b>hello</b> <i>world</i>"), "hello world");
        assert_eq!(strip_markup("<a href=\"x\" title='a>b'>link</a>"), "link");
    }

    #[test]
    fn drops_script_and_style_bodies() {
        assert_eq!(strip_markup("hi<script>alert(1)</script> there"), "hi there");
        assert_eq!(strip_markup("<STYLE>p{}</Style>ok"), "ok");
        assert_eq!(strip_markup("<script src=x />after"), "after");
    }

    #[test]
    fn drops_comments_and_void_elements() {
        assert_eq!(strip_markup("a<!-- hidden -->b"), "ab");
        assert_eq!(strip_markup("<img src=x onerror=alert(1)>"), "");
        assert_eq!(strip_markup("<br/>line"), "line");
    }

    #[test]
    fn leaves_comparison_text_alone() {
        assert_eq!(strip_markup("a < b and c > d"), "a < b and c > d");
        assert_eq!(strip_markup("i <3 rust"), "i <3 rust");
    }

    #[test]
    fn unterminated_tag_is_dropped() {
        assert_eq!(strip_markup("text <b"), "text ");
        assert_eq!(strip_markup("<script>never closed"), "");
    }

    #[test]
    fn keeps_non_ascii_text() {
        assert_eq!(strip_markup("<p>héllo wörld ✓</p>"), "héllo wörld ✓");
    }
}
