//! Line-oriented `<hash>:<path>` format exchanged with the remote helper.
//!
//! Lines are split on the first `:` only. Hashes are hex, so paths that
//! contain `:` survive; paths containing line breaks cannot be expressed.

use tracing::warn;

use super::FileChecksum;

/// Parses helper output into checksum records.
///
/// Blank lines are ignored. Lines without a separator, with a non-hex
/// hash, or with an empty path are logged and skipped.
#[must_use]
pub fn parse_wire(text: &str) -> Vec<FileChecksum> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = line.split_once(':').and_then(|(hash, path)| {
                let valid = !hash.is_empty()
                    && !path.is_empty()
                    && hash.bytes().all(|byte| byte.is_ascii_hexdigit());
                valid.then(|| FileChecksum::new(hash.to_ascii_lowercase(), path))
            });
            if parsed.is_none() {
                warn!(line, "skipping malformed checksum line");
            }
            parsed
        })
        .collect()
}

/// Renders records in the wire format, one per line.
#[must_use]
pub fn render_wire<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = &'a FileChecksum>,
{
    entries.into_iter().fold(String::new(), |mut out, entry| {
        out.push_str(&entry.hash);
        out.push(':');
        out.push_str(&entry.path);
        out.push('\n');
        out
    })
}
