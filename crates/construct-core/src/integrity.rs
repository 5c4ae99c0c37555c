//! Tamper-evident markers for installed text files
//!
//! Markers are a two-line comment header (pack, version, content hash plus a
//! do-not-edit warning) prepended to markdown and YAML files at install
//! time. The hash is computed over the unmarked body and never recomputed
//! automatically, so a later mismatch means the file changed out-of-band.
//! Only file types a human is likely to hand-edit get marked; binary and
//! code files never do.

use std::path::Path;

use crate::hashing::content_hash;

const WARNING_TEXT: &str = "Managed by the construct registry. Do not edit this file by hand.";

/// Parsed marker header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerInfo {
    pub pack: String,
    pub version: String,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerStyle {
    Markdown,
    Yaml,
}

fn style_for_path(path: &Path) -> Option<MarkerStyle> {
    let ext = path.extension()?.to_str()?;
    if ext.eq_ignore_ascii_case("md") {
        Some(MarkerStyle::Markdown)
    } else if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
        Some(MarkerStyle::Yaml)
    } else {
        None
    }
}

/// Whether a file at `path` should receive an integrity marker.
pub fn should_mark(path: &Path) -> bool {
    style_for_path(path).is_some()
}

/// Prepend a marker header to `content`.
///
/// The embedded hash covers the unmarked content exactly as passed in.
/// Returns the content unchanged when the path's file type is not markable.
pub fn add_marker(content: &str, pack: &str, version: &str, path: &Path) -> String {
    let Some(style) = style_for_path(path) else {
        return content.to_string();
    };

    let hash = content_hash(content.as_bytes());
    let header = format!("construct:{}@{} hash:{}", pack, version, hash);

    match style {
        MarkerStyle::Markdown => {
            format!("<!-- {} -->\n<!-- {} -->\n\n{}", header, WARNING_TEXT, content)
        }
        MarkerStyle::Yaml => {
            format!("# {}\n# {}\n\n{}", header, WARNING_TEXT, content)
        }
    }
}

/// Whether `content` starts with a recognized marker header.
pub fn has_marker(content: &str) -> bool {
    extract_marker(content).is_some()
}

/// Parse the marker header, if present.
pub fn extract_marker(content: &str) -> Option<MarkerInfo> {
    let first_line = content.lines().next()?;

    let header = if let Some(inner) = first_line
        .strip_prefix("<!-- ")
        .and_then(|s| s.strip_suffix(" -->"))
    {
        inner
    } else {
        first_line.strip_prefix("# ")?
    };

    let rest = header.strip_prefix("construct:")?;
    let (pack_version, hash_part) = rest.split_once(' ')?;
    let hash = hash_part.strip_prefix("hash:")?;
    let (pack, version) = pack_version.rsplit_once('@')?;

    if pack.is_empty() || version.is_empty() || hash.is_empty() {
        return None;
    }

    Some(MarkerInfo {
        pack: pack.to_string(),
        version: version.to_string(),
        hash: hash.to_string(),
    })
}

/// Strip a detected marker and its separating blank line.
///
/// Idempotent: unmarked content comes back unchanged.
pub fn remove_marker(content: &str) -> String {
    if extract_marker(content).is_none() {
        return content.to_string();
    }

    // Drop the two header lines and the single blank separator.
    let mut rest = content;
    for _ in 0..2 {
        rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or("");
    }
    rest.strip_prefix('\n').unwrap_or(rest).to_string()
}

/// Recompute the body hash and compare against the marker.
///
/// Unmarked content is never considered verified. Equality means the file
/// is byte-identical to what the registry shipped.
pub fn verify_integrity(content: &str) -> bool {
    let Some(marker) = extract_marker(content) else {
        return false;
    };
    let body = remove_marker(content);
    content_hash(body.as_bytes()) == marker.hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn marks_only_text_formats() {
        assert!(should_mark(Path::new("SKILL.md")));
        assert!(should_mark(Path::new("config.yaml")));
        assert!(should_mark(Path::new("config.yml")));
        assert!(!should_mark(Path::new("tool.py")));
        assert!(!should_mark(Path::new("logo.png")));
        assert!(!should_mark(Path::new("README")));
    }

    #[test]
    fn marker_round_trip() {
        let content = "# My Skill\n\nInstructions here.\n";
        let path = PathBuf::from("SKILL.md");
        let marked = add_marker(content, "acme/reviewer", "1.2.0", &path);

        let marker = extract_marker(&marked).expect("marker present");
        assert_eq!(marker.pack, "acme/reviewer");
        assert_eq!(marker.version, "1.2.0");
        assert_eq!(marker.hash, content_hash(content.as_bytes()));

        assert_eq!(remove_marker(&marked), content);
    }

    #[test]
    fn yaml_marker_round_trip() {
        let content = "name: reviewer\nversion: 1.0.0\n";
        let marked = add_marker(content, "acme/reviewer", "1.0.0", Path::new("meta.yaml"));
        assert!(marked.starts_with("# construct:acme/reviewer@1.0.0 hash:"));
        assert_eq!(remove_marker(&marked), content);
        assert!(verify_integrity(&marked));
    }

    #[test]
    fn unmarked_content_never_verifies() {
        assert!(!verify_integrity("just some text\n"));
        assert!(!verify_integrity(""));
    }

    #[test]
    fn remove_marker_is_idempotent_on_unmarked_content() {
        let content = "plain text, no marker\n";
        assert_eq!(remove_marker(content), content);
    }

    #[test]
    fn verified_until_modified() {
        let content = "# Skill\n\nBody text.\n";
        let marked = add_marker(content, "pack", "1.0.0", Path::new("SKILL.md"));
        assert!(verify_integrity(&marked));

        // Any single-byte edit to the body flips verification.
        let tampered = marked.replace("Body", "Bodx");
        assert!(has_marker(&tampered));
        assert!(!verify_integrity(&tampered));
    }

    #[test]
    fn unmarkable_path_leaves_content_unchanged() {
        let content = "print('hi')\n";
        assert_eq!(add_marker(content, "p", "1.0.0", Path::new("tool.py")), content);
    }

    #[test]
    fn empty_content_round_trips() {
        let marked = add_marker("", "pack", "0.1.0", Path::new("notes.md"));
        assert!(verify_integrity(&marked));
        assert_eq!(remove_marker(&marked), "");
    }
}
