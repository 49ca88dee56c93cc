//! Shared string helpers for markup and slugs.

/// Escape a string for safe embedding in HTML text and attribute values.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Convert a title into a URL-safe slug.
///
/// Lowercases, replaces non-alphanumeric characters with hyphens,
/// collapses runs of hyphens and trims them from both ends.
pub fn slugify(text: &str) -> String {
    let slug: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    let mut result = String::with_capacity(slug.len());
    let mut prev_was_hyphen = true;
    for c in slug.chars() {
        if c == '-' {
            if !prev_was_hyphen {
                result.push('-');
            }
            prev_was_hyphen = true;
        } else {
            result.push(c);
            prev_was_hyphen = false;
        }
    }

    while result.ends_with('-') {
        result.pop();
    }

    result
}

/// Remove HTML tags, keeping the text content.
///
/// A `<` only opens a tag when followed by a letter, `/` or `!`.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut chars = html.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' if !in_tag
                && chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || matches!(next, '/' | '!')) =>
            {
                in_tag = true
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Insert `<br />` before every line break.
pub fn nl2br(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "<br />\n")
}
