//! Single-codepoint case folding.

use once_cell::sync::Lazy;

/// Lower-case forms of U+0000..=U+00FF, computed once.
static LATIN1_FOLD: Lazy<[char; 256]> = Lazy::new(|| {
    let mut table = ['\0'; 256];
    for (byte, slot) in (0u8..=255).zip(table.iter_mut()) {
        *slot = fold_slow(char::from(byte));
    }
    table
});

fn fold_slow(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(single), None) => single,
        // Multi-codepoint foldings (e.g. U+0130) are compared as is.
        _ => c,
    }
}

/// Folds `c` to its lower-case form when that form is a single codepoint.
pub fn fold(c: char) -> char {
    match u8::try_from(u32::from(c)) {
        Ok(byte) => LATIN1_FOLD[usize::from(byte)],
        Err(_) => fold_slow(c),
    }
}

/// Compares two names codepoint by codepoint after [`fold`].
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    if a.len() == b.len() && a.eq_ignore_ascii_case(b) {
        return true;
    }
    let mut lhs = a.chars().map(fold);
    let mut rhs = b.chars().map(fold);
    loop {
        match (lhs.next(), rhs.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if x == y => {}
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_and_latin1() {
        assert!(eq_ignore_case("App.INI", "app.ini"));
        assert!(eq_ignore_case("ÉTÉ", "été"));
        assert!(!eq_ignore_case("app.ini", "app.in"));
        assert!(!eq_ignore_case("a", "b"));
        assert_eq!(fold('×'), '×');
    }

    #[test]
    fn beyond_latin1() {
        assert!(eq_ignore_case("ΣΟΦΙΑ", "σοφια"));
        assert!(eq_ignore_case("Привет", "пРИВЕТ"));
        // U+0130 lowers to two codepoints and only matches itself.
        assert!(eq_ignore_case("\u{130}", "\u{130}"));
        assert!(!eq_ignore_case("\u{130}", "i"));
    }
}
