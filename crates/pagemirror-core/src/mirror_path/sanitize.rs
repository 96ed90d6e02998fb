//! Linux-safe sanitization of one mirrored path segment.

/// Sanitizes a single path segment before it is joined under the clone root.
///
/// - Replaces NUL, `/`, `\`, control characters, spaces, and tabs with `_`
/// - Collapses consecutive underscores
/// - Replaces the reserved names `.` and `..` with `_`
/// - Limits length to 255 bytes (Linux NAME_MAX)
///
/// Leading dots are kept so dot-directories (`.well-known/`) mirror cleanly.
pub fn sanitize_segment(segment: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(segment.len());
    let mut prev_underscore = false;

    for c in segment.chars() {
        let replacement = if c == '\0' || c == '/' || c == '\\' || c.is_control() {
            '_'
        } else if c == ' ' || c == '\t' {
            '_'
        } else {
            c
        };

        if replacement == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(replacement);
            prev_underscore = false;
        }
    }

    if out.is_empty() || out == "." || out == ".." {
        return "_".to_string();
    }

    if out.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !out.is_char_boundary(take) {
            take -= 1;
        }
        out.truncate(take);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_separators_and_controls() {
        assert_eq!(sanitize_segment("a\\b\x00c.txt"), "a_b_c.txt");
    }

    #[test]
    fn collapses_underscores() {
        assert_eq!(sanitize_segment("file   name.txt"), "file_name.txt");
    }

    #[test]
    fn reserved_names_replaced() {
        assert_eq!(sanitize_segment("."), "_");
        assert_eq!(sanitize_segment(".."), "_");
        assert_eq!(sanitize_segment(""), "_");
    }

    #[test]
    fn leading_dot_kept() {
        assert_eq!(sanitize_segment(".well-known"), ".well-known");
    }

    #[test]
    fn truncates_to_name_max() {
        let long = "x".repeat(300);
        assert_eq!(sanitize_segment(&long).len(), 255);
    }
}
