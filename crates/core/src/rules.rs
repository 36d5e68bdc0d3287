use regex::{Captures, Regex};
use std::sync::LazyLock;

pub const CANONICAL_PREFIX: &str = "IMG_";
pub const CORRECTION_MARKER: &str = "_보정";

struct RenameRule {
    pattern: Regex,
    extract: fn(&Captures<'_>) -> (String, String),
}

// Evaluated in order; the first matching rule wins.
static RULES: LazyLock<Vec<RenameRule>> = LazyLock::new(|| {
    vec![
        RenameRule {
            pattern: rule_regex(r"(?i)^0R2A(?P<id>[0-9]{4})(?P<marker>_보정(?P<rev>[0-9]+)?)?$"),
            extract: id_with_correction,
        },
        RenameRule {
            pattern: rule_regex(
                r"(?i)^(?:Law|Mey)_[0-9]{6}_(?P<id>[0-9]{4})(?P<marker>_보정(?P<rev>[0-9]+)?)?$",
            ),
            extract: id_with_correction,
        },
        RenameRule {
            pattern: rule_regex(r"(?i)^IMGP(?P<id>[0-9]{4})$"),
            extract: id_only,
        },
    ]
});

fn rule_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("rename rule patterns are valid")
}

/// Maps a camera filename to its canonical `IMG_` name.
///
/// Names that no rule recognises are returned byte-for-byte, extension case
/// included. For recognised names only the extension is lower-cased.
pub fn compute_new_name(original: &str) -> String {
    let (stem, extension) = split_extension(original);

    for rule in RULES.iter() {
        let Some(caps) = rule.pattern.captures(stem) else {
            continue;
        };
        let (id, suffix) = (rule.extract)(&caps);
        let ext = extension.to_lowercase();
        return format!("{CANONICAL_PREFIX}{id}{suffix}{ext}");
    }

    original.to_string()
}

/// Splits a filename into stem and extension (with its dot).
///
/// Leading dots belong to the stem, so `.hidden` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(pos) => name.split_at(leading + pos),
        None => (name, ""),
    }
}

/// Suffix for the n-th correction of a shot: bare marker is `1`, marker
/// followed by `d` is `d + 1`.
pub fn correction_suffix(marker_present: bool, revision: Option<&str>) -> String {
    if !marker_present {
        return String::new();
    }
    match revision {
        Some(digits) => increment_decimal(digits),
        None => "1".to_string(),
    }
}

fn id_with_correction(caps: &Captures<'_>) -> (String, String) {
    let suffix = correction_suffix(
        caps.name("marker").is_some(),
        caps.name("rev").map(|m| m.as_str()),
    );
    (caps["id"].to_string(), suffix)
}

fn id_only(caps: &Captures<'_>) -> (String, String) {
    (caps["id"].to_string(), String::new())
}

// Integer parse plus one, without a width limit.
fn increment_decimal(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    let mut out: Vec<u8> = if trimmed.is_empty() {
        vec![b'0']
    } else {
        trimmed.bytes().collect()
    };

    let mut carry = true;
    for byte in out.iter_mut().rev() {
        if !carry {
            break;
        }
        if *byte == b'9' {
            *byte = b'0';
        } else {
            *byte += 1;
            carry = false;
        }
    }
    if carry {
        out.insert(0, b'1');
    }

    out.into_iter().map(char::from).collect()
}
