// Keyhook Canonical Names
// Key name normalization and the modifier name sets

/// Modifiers that come in left and right variants.
pub const SIDED_MODIFIERS: &[&str] = &["ctrl", "alt", "shift", "windows"];

/// Every name that denotes a modifier key, sided or not.
pub const ALL_MODIFIERS: &[&str] = &[
    "alt",
    "alt gr",
    "ctrl",
    "shift",
    "windows",
    "left alt",
    "right alt",
    "left ctrl",
    "right ctrl",
    "left shift",
    "right shift",
    "left windows",
    "right windows",
];

/// Check if a normalized name denotes a modifier key
pub fn is_modifier_name(name: &str) -> bool {
    ALL_MODIFIERS.contains(&name)
}

/// Canonical spelling for common aliases.
fn canonical_alias(name: &str) -> Option<&'static str> {
    let canonical = match name {
        " " | "spacebar" => "space",
        "\n" | "\r" => "enter",
        "\t" => "tab",
        "\u{8}" => "backspace",
        "escape" => "esc",
        "return" => "enter",
        "del" => "delete",
        "ins" => "insert",
        "bksp" | "back space" => "backspace",
        "control" => "ctrl",
        "win" | "super" | "command" | "cmd" | "meta" | "gui" => "windows",
        "option" | "opt" => "alt",
        "altgr" => "alt gr",
        "left arrow" => "left",
        "right arrow" => "right",
        "up arrow" => "up",
        "down arrow" => "down",
        "pgup" | "prior" => "page up",
        "pgdn" | "next" => "page down",
        "capslock" | "caps" => "caps lock",
        "numlock" => "num lock",
        "scrolllock" => "scroll lock",
        "prtsc" | "prtscr" | "printscreen" | "print" | "sysrq" => "print screen",
        "app" | "apps" | "application" | "compose" => "menu",
        "plus" => "+",
        "minus" | "dash" | "hyphen" => "-",
        "comma" => ",",
        "period" | "dot" | "full stop" => ".",
        "slash" => "/",
        "backslash" => "\\",
        "semicolon" => ";",
        "colon" => ":",
        "quote" | "apostrophe" | "single quote" => "'",
        "double quote" => "\"",
        "grave" | "backtick" | "backquote" => "`",
        "tilde" => "~",
        "equal" | "equals" => "=",
        "underscore" | "under" => "_",
        "left bracket" => "[",
        "right bracket" => "]",
        "left brace" => "{",
        "right brace" => "}",
        "left parenthesis" => "(",
        "right parenthesis" => ")",
        "exclamation" => "!",
        "at" => "@",
        "hash" | "pound" => "#",
        "dollar" => "$",
        "percent" => "%",
        "caret" => "^",
        "ampersand" => "&",
        "asterisk" | "star" => "*",
        "pipe" => "|",
        "less" => "<",
        "greater" => ">",
        "question" => "?",
        _ => return None,
    };
    Some(canonical)
}

/// Normalize a user-provided key name.
///
/// Names are lower-cased, underscores become spaces, aliases are replaced by
/// their canonical spelling, and `left `/`right ` prefixes are preserved
/// around a normalized base name. Single characters keep their case, so
/// `"A"` still means shift+a and `"+"` stays `"+"`.
pub fn normalize_name(raw: &str) -> String {
    if raw.chars().count() == 1 {
        return canonical_alias(raw).unwrap_or(raw).to_string();
    }

    let lowered = raw.trim().to_lowercase().replace('_', " ");
    if let Some(canonical) = canonical_alias(&lowered) {
        return canonical.to_string();
    }

    for side in ["left ", "right "] {
        if let Some(base) = lowered.strip_prefix(side) {
            let base = canonical_alias(base).unwrap_or(base);
            if SIDED_MODIFIERS.contains(&base) {
                return format!("{}{}", side, base);
            }
        }
    }

    // Compact spellings such as "lctrl" or "rshift".
    for (prefix, side) in [("l", "left "), ("r", "right ")] {
        if let Some(base) = lowered.strip_prefix(prefix) {
            let base = canonical_alias(base).unwrap_or(base);
            if SIDED_MODIFIERS.contains(&base) {
                return format!("{}{}", side, base);
            }
        }
    }

    lowered
}
