// Keyhook Hotkey Naming
// Canonical, human-readable names for sets of keys

use std::collections::BTreeSet;

use crate::names::normalize_name;

/// Modifier order used when naming hotkeys: Control, Option, Shift, Command.
const MODIFIER_ORDER: &[&str] = &["ctrl", "alt", "shift", "windows"];

fn strip_side(name: &str) -> String {
    name.replace("left ", "").replace("right ", "").replace('+', "plus")
}

fn sort_key(name: &str) -> (usize, &str) {
    let rank = MODIFIER_ORDER
        .iter()
        .position(|m| *m == name)
        .unwrap_or(MODIFIER_ORDER.len() + 1);
    (rank, name)
}

/// Build the canonical name of a set of keys.
///
/// Names are normalized and stripped of their side, `+` becomes `plus`,
/// modifiers come first in a fixed order and the rest are sorted.
///
/// ```
/// use keyhook_core::get_hotkey_name;
/// assert_eq!(get_hotkey_name(["+", "left ctrl", "shift"]), "ctrl+shift+plus");
/// ```
pub fn get_hotkey_name<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let unique: BTreeSet<String> = names
        .into_iter()
        .map(|name| strip_side(&normalize_name(name.as_ref())))
        .collect();
    let mut ordered: Vec<&str> = unique.iter().map(String::as_str).collect();
    ordered.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    ordered.join("+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifiers_first_in_order() {
        assert_eq!(get_hotkey_name(["left ctrl", "shift", "+"]), "ctrl+shift+plus");
        assert_eq!(get_hotkey_name(["a", "windows", "alt", "ctrl"]), "ctrl+alt+windows+a");
    }

    #[test]
    fn test_sides_collapse() {
        assert_eq!(get_hotkey_name(["left shift", "right shift", "x"]), "shift+x");
    }

    #[test]
    fn test_other_keys_sorted() {
        assert_eq!(get_hotkey_name(["space", "b", "a"]), "a+b+space");
    }

    #[test]
    fn test_aliases_normalized() {
        assert_eq!(get_hotkey_name(["Control", "Return"]), "ctrl+enter");
        assert_eq!(get_hotkey_name(Vec::<String>::new()), "");
    }
}
