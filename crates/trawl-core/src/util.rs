use url::Url;

/// Collapse all runs of whitespace (including newlines) into single spaces
/// and trim the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Like [`clean_text`], but maps an empty result to `None`.
pub fn non_empty_text(text: &str) -> Option<String> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Parse a human-formatted price into a number.
///
/// Strips everything except digits and `.`/`,`, then decides which separator
/// is the decimal mark:
/// - both present: the one that occurs last is the decimal mark
///   (`$1,500.99`, `1.500,99`)
/// - one kind, repeated: thousands grouping (`Rp 1.500.000`)
/// - one kind, once: thousands if exactly three digits follow (`1.500`),
///   otherwise decimal (`12.99`, `4,5`)
///
/// Returns `None` when nothing numeric remains.
pub fn extract_price(input: &str) -> Option<f64> {
    let kept: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let cleaned = kept.trim_matches(|c| c == '.' || c == ',');

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let decimal_mark = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) => Some(if dot > comma { '.' } else { ',' }),
        (Some(_), None) => lone_separator_role(cleaned, '.'),
        (None, Some(_)) => lone_separator_role(cleaned, ','),
        (None, None) => None,
    };

    let normalized: String = cleaned
        .chars()
        .filter_map(|c| {
            if c.is_ascii_digit() {
                Some(c)
            } else if Some(c) == decimal_mark {
                Some('.')
            } else {
                None
            }
        })
        .collect();

    normalized.parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Returns `Some(sep)` if `sep` acts as the decimal mark in a string that
/// contains only that one kind of separator.
fn lone_separator_role(s: &str, sep: char) -> Option<char> {
    if s.matches(sep).count() > 1 {
        return None;
    }
    let idx = s.rfind(sep)?;
    let digits_after = s.len() - idx - sep.len_utf8();
    if digits_after == 3 { None } else { Some(sep) }
}

/// True if the string parses as an absolute URL.
pub fn is_valid_url(s: &str) -> bool {
    Url::parse(s).is_ok()
}

/// Resolve `href` against `base`. Absolute `href`s are returned unchanged.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    Url::parse(base)
        .ok()?
        .join(href)
        .ok()
        .map(|u| u.to_string())
}

/// Host portion of a URL, lowercased. `None` for unparseable input.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.to_ascii_lowercase())
}
