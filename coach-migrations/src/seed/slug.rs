use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const SEPARATOR: char = '-';

/// Trim and lower-case a natural-key string (email, locale, slug) before it is used as a filter
/// or index value.
pub fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Derive a URL-friendly slug from a display label.
///
/// Diacritics are stripped (NFD decomposition, combining marks dropped), the result is
/// lower-cased, every run of non-alphanumeric characters becomes a single `-`, and leading or
/// trailing separators are removed. The function is pure: the same label always yields the same
/// slug, which is what lets a re-run seed target the row it created before.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut separate = false;
    // Lower-casing can itself emit combining marks (`İ` becomes `i` + U+0307).
    let lowered = label.to_lowercase();
    for c in lowered.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if separate && !slug.is_empty() {
                slug.push(SEPARATOR);
            }
            separate = false;
            slug.push(c);
        } else {
            separate = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics_and_case() {
        assert_eq!(slugify("Équipements Élastiques"), "equipements-elastiques");
        assert_eq!(
            slugify("Équipements Élastiques"),
            slugify("equipements elastiques")
        );
    }

    #[test]
    fn is_stable() {
        let once = slugify("Développé couché");
        assert_eq!(once, "developpe-couche");
        assert_eq!(slugify("Développé couché"), once);
        assert_eq!(slugify(&once), once);
    }

    #[test]
    fn lowercasing_does_not_leave_combining_marks() {
        assert_eq!(slugify("\u{130}stanbul"), "istanbul");
        let once = slugify("Kettlebell \u{130}\u{308}");
        assert_eq!(slugify(&once), once);
        assert!(once.chars().all(|c| c.is_ascii()));
    }

    #[test]
    fn collapses_and_trims_separators() {
        assert_eq!(slugify("  --Haut   du / corps!! "), "haut-du-corps");
        assert_eq!(slugify("Ischio-jambiers"), "ischio-jambiers");
        assert_eq!(slugify("Gainage (30s)"), "gainage-30s");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn precomposed_and_decomposed_inputs_agree() {
        assert_eq!(slugify("Mobilit\u{e9}"), slugify("Mobilite\u{301}"));
    }

    #[test]
    fn normalize_key_trims_and_lowercases() {
        assert_eq!(normalize_key("  Admin@Example.COM "), "admin@example.com");
    }
}
