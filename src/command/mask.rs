//! Secret masking for logged command lines.

use super::CONF_FLAG;

/// Placeholder written in place of masked values.
pub const MASK: &str = "******";

/// Key fragments whose values never reach the logs.
const SECRET_KEY_FRAGMENTS: &[&str] = &["secret", "password"];

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_KEY_FRAGMENTS.iter().any(|frag| key.contains(frag))
}

/// Render argv as one line with secret conf values replaced by [`MASK`].
pub fn mask_command(argv: &[String]) -> String {
    let mut rendered = Vec::with_capacity(argv.len());
    let mut after_conf = false;

    for arg in argv {
        let masked = if after_conf {
            mask_conf_entry(arg)
        } else {
            None
        };
        rendered.push(masked.unwrap_or_else(|| arg.clone()));
        after_conf = arg == CONF_FLAG;
    }

    rendered.join(" ")
}

fn mask_conf_entry(entry: &str) -> Option<String> {
    let (key, _) = entry.split_once('=')?;
    if is_secret_key(key) {
        Some(format!("{}={}", key, MASK))
    } else {
        None
    }
}
