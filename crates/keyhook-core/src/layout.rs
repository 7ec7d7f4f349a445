// Keyhook US Layout
// Default name table mapping canonical names to Linux input-event-codes

use crate::backend::KeyMapping;

/// One way of producing a named key on the US layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    pub name: &'static str,
    pub code: u16,
    /// Shift must be held to produce this name
    pub shift: bool,
    /// Key lives on the numeric keypad
    pub keypad: bool,
}

const fn key(name: &'static str, code: u16) -> LayoutEntry {
    LayoutEntry { name, code, shift: false, keypad: false }
}

const fn shifted(name: &'static str, code: u16) -> LayoutEntry {
    LayoutEntry { name, code, shift: true, keypad: false }
}

const fn keypad(name: &'static str, code: u16) -> LayoutEntry {
    LayoutEntry { name, code, shift: false, keypad: true }
}

/// Entries are ordered so the preferred encoding of a name comes first.
pub const US_LAYOUT: &[LayoutEntry] = &[
    key("esc", 1),
    key("1", 2),
    key("2", 3),
    key("3", 4),
    key("4", 5),
    key("5", 6),
    key("6", 7),
    key("7", 8),
    key("8", 9),
    key("9", 10),
    key("0", 11),
    key("-", 12),
    key("=", 13),
    key("backspace", 14),
    key("tab", 15),
    key("q", 16),
    key("w", 17),
    key("e", 18),
    key("r", 19),
    key("t", 20),
    key("y", 21),
    key("u", 22),
    key("i", 23),
    key("o", 24),
    key("p", 25),
    key("[", 26),
    key("]", 27),
    key("enter", 28),
    key("left ctrl", 29),
    key("a", 30),
    key("s", 31),
    key("d", 32),
    key("f", 33),
    key("g", 34),
    key("h", 35),
    key("j", 36),
    key("k", 37),
    key("l", 38),
    key(";", 39),
    key("'", 40),
    key("`", 41),
    key("left shift", 42),
    key("\\", 43),
    key("z", 44),
    key("x", 45),
    key("c", 46),
    key("v", 47),
    key("b", 48),
    key("n", 49),
    key("m", 50),
    key(",", 51),
    key(".", 52),
    key("/", 53),
    key("right shift", 54),
    key("left alt", 56),
    key("space", 57),
    key("caps lock", 58),
    key("f1", 59),
    key("f2", 60),
    key("f3", 61),
    key("f4", 62),
    key("f5", 63),
    key("f6", 64),
    key("f7", 65),
    key("f8", 66),
    key("f9", 67),
    key("f10", 68),
    key("num lock", 69),
    key("scroll lock", 70),
    key("f11", 87),
    key("f12", 88),
    key("right ctrl", 97),
    key("print screen", 99),
    key("right alt", 100),
    key("alt gr", 100),
    key("home", 102),
    key("up", 103),
    key("page up", 104),
    key("left", 105),
    key("right", 106),
    key("end", 107),
    key("down", 108),
    key("page down", 109),
    key("insert", 110),
    key("delete", 111),
    key("mute", 113),
    key("volume down", 114),
    key("volume up", 115),
    key("pause", 119),
    key("left windows", 125),
    key("right windows", 126),
    key("menu", 139),
    key("f13", 183),
    key("f14", 184),
    key("f15", 185),
    key("f16", 186),
    key("f17", 187),
    key("f18", 188),
    key("f19", 189),
    key("f20", 190),
    key("f21", 191),
    key("f22", 192),
    key("f23", 193),
    key("f24", 194),
    key("next track", 163),
    key("play/pause media", 164),
    key("previous track", 165),
    key("stop media", 166),
    shifted("!", 2),
    shifted("@", 3),
    shifted("#", 4),
    shifted("$", 5),
    shifted("%", 6),
    shifted("^", 7),
    shifted("&", 8),
    shifted("*", 9),
    shifted("(", 10),
    shifted(")", 11),
    shifted("_", 12),
    shifted("+", 13),
    shifted("{", 26),
    shifted("}", 27),
    shifted(":", 39),
    shifted("\"", 40),
    shifted("~", 41),
    shifted("|", 43),
    shifted("<", 51),
    shifted(">", 52),
    shifted("?", 53),
    keypad("7", 71),
    keypad("8", 72),
    keypad("9", 73),
    keypad("-", 74),
    keypad("4", 75),
    keypad("5", 76),
    keypad("6", 77),
    keypad("+", 78),
    keypad("1", 79),
    keypad("2", 80),
    keypad("3", 81),
    keypad("0", 82),
    keypad(".", 83),
    keypad("enter", 96),
    keypad("/", 98),
    keypad("*", 55),
];

/// Resolve a normalized name to every encoding that produces it.
///
/// Upper-case letters resolve to the letter key with shift held.
pub fn lookup(name: &str) -> Vec<KeyMapping> {
    let mut mappings: Vec<KeyMapping> = US_LAYOUT
        .iter()
        .filter(|entry| entry.name == name)
        .map(|entry| KeyMapping {
            scan_code: entry.code,
            modifiers: if entry.shift { vec!["shift".to_string()] } else { Vec::new() },
        })
        .collect();

    if mappings.is_empty() {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_uppercase() {
                let lower = c.to_ascii_lowercase().to_string();
                mappings = lookup(&lower)
                    .into_iter()
                    .map(|m| KeyMapping {
                        modifiers: vec!["shift".to_string()],
                        ..m
                    })
                    .collect();
            }
        }
    }

    mappings
}

/// Name and keypad flag for a scan code, as reported on key events.
pub fn name_for(code: u16) -> Option<(&'static str, bool)> {
    US_LAYOUT
        .iter()
        .find(|entry| entry.code == code && !entry.shift)
        .map(|entry| (entry.name, entry.keypad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::{normalize_name, ALL_MODIFIERS};

    fn codes(name: &str) -> Vec<u16> {
        lookup(name).iter().map(|m| m.scan_code).collect()
    }

    #[test]
    fn test_lookup_letters() {
        assert_eq!(codes("a"), vec![30]);
        let upper = lookup("A");
        assert_eq!(upper.len(), 1);
        assert_eq!(upper[0].scan_code, 30);
        assert_eq!(upper[0].modifiers, vec!["shift".to_string()]);
    }

    #[test]
    fn test_lookup_digits_include_keypad() {
        assert_eq!(codes("1"), vec![2, 79]);
        assert_eq!(codes("enter"), vec![28, 96]);
    }

    #[test]
    fn test_lookup_shifted_symbols() {
        let bang = lookup("!");
        assert_eq!(bang[0].scan_code, 2);
        assert_eq!(bang[0].modifiers, vec!["shift".to_string()]);
        // Main row first, keypad plus second.
        assert_eq!(codes("+"), vec![13, 78]);
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(lookup("not a key").is_empty());
    }

    #[test]
    fn test_name_for() {
        assert_eq!(name_for(30), Some(("a", false)));
        assert_eq!(name_for(79), Some(("1", true)));
        assert_eq!(name_for(100), Some(("right alt", false)));
        assert_eq!(name_for(999), None);
    }

    #[test]
    fn test_every_layout_name_is_normalized() {
        for entry in US_LAYOUT {
            assert_eq!(normalize_name(entry.name), entry.name, "{}", entry.name);
        }
    }

    #[test]
    fn test_sided_modifiers_are_mapped() {
        for name in ALL_MODIFIERS.iter().filter(|n| n.starts_with("left ") || n.starts_with("right ")) {
            assert!(!lookup(name).is_empty(), "{} should be mapped", name);
        }
    }
}
