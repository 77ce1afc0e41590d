use std::sync::OnceLock;

use regex::Regex;

fn pattern(cell: &'static OnceLock<Option<Regex>>, re: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(re).ok()).as_ref()
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    pattern(&EMAIL, r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]+$")
        .is_some_and(|re| re.is_match(email.trim()))
}

/// SKUs are non-empty and strictly alphanumeric.
pub fn is_valid_sku(sku: &str) -> bool {
    static SKU: OnceLock<Option<Regex>> = OnceLock::new();
    pattern(&SKU, r"^[A-Za-z0-9]+$").is_some_and(|re| re.is_match(sku))
}

/// `#RRGGBB`
pub fn is_valid_color_hex(color: &str) -> bool {
    static COLOR: OnceLock<Option<Regex>> = OnceLock::new();
    pattern(&COLOR, r"^#[0-9A-Fa-f]{6}$").is_some_and(|re| re.is_match(color))
}

pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn emails() {
        assert!(is_valid_email("x@y.z"));
        assert!(is_valid_email("first.last+shop@mail.example.com"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
    }

    #[test]
    fn skus() {
        assert!(is_valid_sku("TSHIRT001"));
        assert!(!is_valid_sku("T-SHIRT"));
        assert!(!is_valid_sku(""));
    }

    #[test]
    fn colors() {
        assert!(is_valid_color_hex("#00ffAA"));
        assert!(!is_valid_color_hex("00ffAA"));
        assert!(!is_valid_color_hex("#00ffA"));
        assert!(!is_valid_color_hex("#00ffAZ"));
    }
}
