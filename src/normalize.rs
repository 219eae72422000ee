//! Canonical comparison keys for free-text artist names.

/// Normalize an artist name into a comparison key.
///
/// Steps, in order: lowercase, strip a leading `"the "`, drop apostrophes, drop every
/// character that is neither alphanumeric nor whitespace, collapse whitespace runs.
/// The result is only ever used for equality/containment checks and as a cache key; the
/// provider's spelling stays the display name.
///
/// # Examples
///
/// ```rust
/// use artist_atlas::normalize_name;
///
/// assert_eq!(normalize_name("The Beatles"), "beatles");
/// assert_eq!(normalize_name("Godspeed You! Black Emperor"), "godspeed you black emperor");
/// assert_eq!(normalize_name("  Guns N' Roses "), "guns n roses");
/// ```
pub fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let without_article = lowered.strip_prefix("the ").unwrap_or(&lowered);

    let mut kept = String::with_capacity(without_article.len());
    for ch in without_article.chars() {
        if is_apostrophe(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            kept.push(ch);
        } else if ch.is_whitespace() {
            kept.push(' ');
        }
    }

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_apostrophe(ch: char) -> bool {
    matches!(ch, '\'' | '\u{2019}' | '\u{2018}' | '`')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_article_is_stripped() {
        assert_eq!(normalize_name("The Beatles"), "beatles");
        assert_eq!(normalize_name("the beatles"), normalize_name("Beatles"));
        // Only a leading article counts.
        assert_eq!(normalize_name("Boris the Spider"), "boris the spider");
        assert_eq!(normalize_name("Theatre of Tragedy"), "theatre of tragedy");
    }

    #[test]
    fn test_apostrophes_join_words() {
        assert_eq!(normalize_name("Guns N' Roses"), "guns n roses");
        assert_eq!(normalize_name("Sinéad O’Connor"), "sinéad oconnor");
        assert_eq!(normalize_name("Don't"), "dont");
    }

    #[test]
    fn test_punctuation_removed_and_whitespace_collapsed() {
        assert_eq!(
            normalize_name("Godspeed You! Black Emperor"),
            "godspeed you black emperor"
        );
        assert_eq!(normalize_name("Boris (band)"), "boris band");
        assert_eq!(normalize_name("  Sigur   Rós\t"), "sigur rós");
        assert_eq!(normalize_name("AC/DC"), "acdc");
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("   "), "");
        assert_eq!(normalize_name("!!!"), "");
        // A bare article is a name, not a prefix.
        assert_eq!(normalize_name("The "), "the");
        assert_eq!(normalize_name("The The"), "the");
    }

    #[test]
    fn test_idempotent() {
        for name in ["The Beatles", "Björk", "Mötley Crüe", "A Tribe Called Quest"] {
            let once = normalize_name(name);
            assert_eq!(normalize_name(&once), once);
        }
    }
}
