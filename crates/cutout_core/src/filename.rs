/// Replaces the last extension of `source_name` with `extension`.
///
/// `cat.jpg` -> `cat.png`, `a.tar.gz` -> `a.tar.png`, `noext` -> `noext.png`.
/// A leading dot is part of the stem, so `.hidden` -> `.hidden.png`.
pub fn derive_output_name(source_name: &str, extension: &str) -> String {
    format!("{}.{extension}", stem(source_name))
}

/// Inserts ` (n)` before the extension: `cat.png`, 2 -> `cat (2).png`.
pub fn suffixed_name(name: &str, n: usize) -> String {
    let base = stem(name);
    match &name[base.len()..] {
        "" => format!("{base} ({n})"),
        ext => format!("{base} ({n}){ext}"),
    }
}

fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Windows-safe file name for writing a download to disk.
pub fn sanitize_file_name(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim_matches(&['_', ' ', '.'][..]);

    // Collapse multiple underscores
    let mut compacted = String::with_capacity(trimmed.len());
    let mut prev_underscore = false;
    for c in trimmed.chars() {
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }
    if compacted.is_empty() {
        compacted.push_str("untitled");
    }
    if is_reserved_windows_name(stem(&compacted)) {
        compacted.insert(stem(&compacted).len(), '_');
    }
    compacted
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
