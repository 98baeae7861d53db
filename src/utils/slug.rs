/// Longest slug kept; longer names are cut at a word boundary when possible.
const MAX_SLUG_LEN: usize = 255;

/// Lowercases `input`, keeps ASCII alphanumerics and joins everything else
/// into single dashes. Never returns an empty string.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        if let Some(idx) = slug.rfind('-') {
            slug.truncate(idx);
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}
