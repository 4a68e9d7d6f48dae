//! Compact display of the files a commit touched.

/// Length of the common directory prefix of `a` and `b`, looking at no more
/// than `max` bytes. The prefix always ends just after a `/`.
pub fn path_prefix_length(a: &str, b: &str, max: usize) -> usize {
    let mut length = 0;
    for (i, (x, y)) in a.bytes().zip(b.bytes()).enumerate().take(max) {
        if x != y {
            break;
        }
        if x == b'/' {
            length = i + 1;
        }
    }
    length
}

/// Displays a rename or copy as `dir/{old => new}`.
pub fn rename_display(old: &str, new: &str) -> String {
    let prefix = path_prefix_length(old, new, old.len().min(new.len()));
    format!("{}{{{} => {}}}", &old[..prefix], &old[prefix..], &new[prefix..])
}

/// Collapses a list of paths into one string.
///
/// A shared directory prefix of at least two characters is printed once and
/// stripped from every path: `["a/b/c", "a/b/d"]` becomes `"a/b/ c d"`.
pub fn summarize_paths<S: AsRef<str>>(paths: &[S]) -> Option<String> {
    let (first, rest) = paths.split_first()?;
    let first = first.as_ref();
    if rest.is_empty() {
        return Some(first.to_string());
    }

    let mut prefix = first.len();
    for path in rest {
        prefix = path_prefix_length(first, path.as_ref(), prefix);
        if prefix < 2 {
            prefix = 0;
            break;
        }
    }

    let stripped: Vec<&str> = paths.iter().map(|p| &p.as_ref()[prefix..]).collect();
    let joined = stripped.join(" ");
    if prefix == 0 {
        Some(joined)
    } else {
        Some(format!("{} {}", &first[..prefix], joined))
    }
}
