//! Commit message splitting.

const CLOSING_KEYWORDS: &[&str] = &[
    "close", "closes", "closed", "fix", "fixes", "fixed", "resolve", "resolves", "resolved",
];

/// `Token: value` footers (`Signed-off-by:`, `Reviewed-by:`, ...) and
/// issue-closing lines (`Fixes #12`).
fn is_trailer(line: &str) -> bool {
    if let Some((token, _)) = line.split_once(':') {
        if !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return true;
        }
    }

    line.split_whitespace()
        .next()
        .map(|word| word.trim_end_matches(':').to_ascii_lowercase())
        .is_some_and(|word| CLOSING_KEYWORDS.contains(&word.as_str()))
}

fn non_empty(body: &str) -> Option<&str> {
    let body = body.trim_end();
    (!body.is_empty()).then_some(body)
}

/// Splits a commit message into its subject line and body.
///
/// Trailing blocks made only of trailers are dropped from the body. A block
/// mixing trailers and prose is kept whole.
pub fn split_message(message: &str) -> (&str, Option<&str>) {
    let Some((subject, rest)) = message.split_once('\n') else {
        return (message, None);
    };

    let mut body_start = 0;
    for line in rest.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        body_start += line.len();
    }
    let rest = &rest[body_start..];
    if rest.trim().is_empty() {
        return (subject, None);
    }

    let mut lines = Vec::new();
    let mut start = 0;
    for line in rest.split('\n') {
        lines.push((start, line));
        start += line.len() + 1;
    }

    let mut seen_trailer = false;
    let mut after_blank = false;
    for &(start, line) in lines.iter().rev() {
        if line.trim().is_empty() {
            after_blank = true;
            continue;
        }
        if is_trailer(line) {
            seen_trailer = true;
            after_blank = false;
            continue;
        }
        if seen_trailer && after_blank {
            return (subject, non_empty(&rest[..start + line.len()]));
        }
        // Prose at the end, or inside a trailer block
        return (subject, non_empty(rest));
    }

    (subject, None)
}
