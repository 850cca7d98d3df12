//! Helpers for handling lossy model output. LLM answers routinely arrive
//! wrapped in code fences, with trailing commas, or buried in prose; callers
//! compose these into a strict-then-repair parsing chain.

use regex::Regex;

/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code-fence markers from a response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Extract the first top-level `[...]` literal from free-form text.
///
/// Brackets inside JSON string literals are skipped, so prose like
/// "see [1]" before the array does confuse this only if it starts with
/// an unclosed bracket — in that case the strict parse downstream fails
/// and the caller degrades to an empty result.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove trailing commas before `]` or `}`. Repair heuristic only — a
/// comma inside a string literal right before a bracket can be mangled,
/// which is acceptable on the already-degraded path this runs on.
pub fn strip_trailing_commas(json: &str) -> String {
    let re = Regex::new(r",\s*([\]}])").expect("static regex");
    re.replace_all(json, "$1").into_owned()
}
