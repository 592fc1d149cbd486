use percent_encoding::percent_decode_str;
use url::Url;

use crate::hashing::url_digest;

/// Derives the destination file name for a URL.
///
/// Takes the last path segment and percent-decodes it. A segment with a
/// malformed escape, or one that decodes to invalid UTF-8, is used raw.
/// URLs without a usable segment get a name derived from the URL digest so
/// that a later run resumes into the same file.
pub fn file_name_from_url(url_str: &str) -> String {
    let segment = last_path_segment(url_str);
    let name = match segment {
        Some(raw) => decode_segment(&raw),
        None => String::new(),
    };

    if name.is_empty() || name == "." || name == ".." {
        return fallback_name(url_str);
    }
    name.replace(['/', '\\'], "_")
}

fn last_path_segment(url_str: &str) -> Option<String> {
    match Url::parse(url_str) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.last())
            .map(str::to_string),
        // Not a URL we can parse: strip query/fragment and split by hand
        Err(_) => {
            let path = url_str.split(['?', '#']).next().unwrap_or_default();
            path.rsplit('/').next().map(str::to_string)
        }
    }
}

/// Percent-decodes `raw`, falling back to `raw` unchanged when it is not
/// valid percent-encoding.
pub fn decode_segment(raw: &str) -> String {
    if !has_valid_escapes(raw) {
        return raw.to_string();
    }
    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

fn has_valid_escapes(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3);
            match hex {
                Some(h) if h.iter().all(u8::is_ascii_hexdigit) => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}

fn fallback_name(url_str: &str) -> String {
    format!("download_{}", &url_digest(url_str)[..16])
}
