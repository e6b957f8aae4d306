//! Extension hints and filename sanitization for fetched pages and archives.

use url::Url;

/// Longest extension accepted from a URL path, excluding the dot.
const MAX_EXTENSION_LEN: usize = 5;

/// Extracts a lowercase extension hint (without the dot) from a URL path.
///
/// Returns `None` when the last path segment has no usable extension.
#[must_use]
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let dot_index = last_segment.rfind('.')?;
    let ext = &last_segment[dot_index + 1..];
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Guesses an image extension (without the dot) from a Content-Type header.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        _ => None,
    }
}

/// Extension hint for a fetched file: the URL suffix, else the content type.
#[must_use]
pub fn extension_hint(url: &str, content_type: Option<&str>) -> Option<String> {
    extension_from_url(url).or_else(|| {
        content_type
            .and_then(extension_from_content_type)
            .map(String::from)
    })
}

/// Collapses a free-form title into a filesystem-safe name component.
///
/// Separators, whitespace, and reserved characters become single `_`,
/// and leading/trailing `_` are trimmed.
#[must_use]
pub fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\'' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    trimmed.to_string()
}
