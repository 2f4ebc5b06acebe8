//! Changelog editing: version headers and entry bullets

use semver::Version;

fn header_prefix(version: &Version) -> String {
    format!("## [{}]", version)
}

/// `## [x.y.z] - YYYY-MM-DD`
pub fn version_header(version: &Version, date: &str) -> String {
    format!("{} - {}", header_prefix(version), date)
}

pub fn has_version_header(content: &str, version: &Version) -> bool {
    let prefix = header_prefix(version);
    content.lines().any(|l| l.trim_start().starts_with(&prefix))
}

/// Insert a version header after the first H1 (or at the top).
/// Returns `None` when the header is already present.
pub fn insert_version_header(content: &str, version: &Version, date: &str) -> Option<String> {
    if has_version_header(content, version) {
        return None;
    }

    let header = version_header(version, date);
    let lines: Vec<&str> = content.lines().collect();
    let insert_at = lines
        .iter()
        .position(|l| l.starts_with("# "))
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut out: Vec<String> = lines[..insert_at].iter().map(|l| l.to_string()).collect();
    if insert_at > 0 {
        out.push(String::new());
    }
    out.push(header);
    out.push(String::new());
    // Drop blank lines directly after the insertion point to keep spacing even
    out.extend(
        lines[insert_at..]
            .iter()
            .skip_while(|l| l.trim().is_empty())
            .map(|l| l.to_string()),
    );

    let mut result = out.join("\n");
    result.push('\n');
    Some(result)
}

/// Add `- entry` bullets directly below the version header, creating the
/// header if needed. Entries already listed under that header are skipped.
pub fn insert_entries(content: &str, version: &Version, date: &str, entries: &[String]) -> String {
    let content = insert_version_header(content, version, date).unwrap_or_else(|| content.to_string());
    let prefix = header_prefix(version);
    let lines: Vec<&str> = content.lines().collect();

    let Some(header_idx) = lines.iter().position(|l| l.trim_start().starts_with(&prefix)) else {
        return content;
    };
    let section_end = lines[header_idx + 1..]
        .iter()
        .position(|l| l.starts_with("## "))
        .map(|i| header_idx + 1 + i)
        .unwrap_or(lines.len());
    let existing: Vec<&str> = lines[header_idx + 1..section_end]
        .iter()
        .map(|l| l.trim())
        .collect();

    let new_bullets: Vec<String> = entries
        .iter()
        .map(|e| format!("- {}", e.trim()))
        .filter(|b| !existing.contains(&b.as_str()))
        .collect();
    if new_bullets.is_empty() {
        return content;
    }

    let mut out: Vec<String> = lines[..=header_idx].iter().map(|l| l.to_string()).collect();
    out.push(String::new());
    out.extend(new_bullets);
    let rest: Vec<&str> = lines[header_idx + 1..]
        .iter()
        .copied()
        .skip_while(|l| l.trim().is_empty())
        .collect();
    if !rest.is_empty() && !rest[0].starts_with("- ") {
        out.push(String::new());
    }
    out.extend(rest.iter().map(|l| l.to_string()));

    let mut result = out.join("\n");
    result.push('\n');
    result
}
