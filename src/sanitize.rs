//! Filename helpers shared by exporters and the importer.

/// Fallback name when a title sanitizes to nothing.
pub const FALLBACK_FILENAME: &str = "book_export";

/// Default maximum length (in characters) of a sanitized title.
pub const MAX_FILENAME_LEN: usize = 200;

/// Sanitize a book title for use as a filename.
///
/// Drops characters that are invalid on common filesystems, turns spaces
/// into underscores, keeps only word characters, `-` and `.`, collapses
/// underscore runs and trims them from both ends.
///
/// `"My Book: A Story"` becomes `"My_Book_A_Story"`; an empty or
/// whitespace-only title becomes [`FALLBACK_FILENAME`].
pub fn sanitize_filename(title: &str) -> String {
    sanitize_filename_with_len(title, MAX_FILENAME_LEN)
}

/// [`sanitize_filename`] with an explicit length limit.
pub fn sanitize_filename_with_len(title: &str, max_length: usize) -> String {
    if title.trim().is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    let mut sanitized = String::with_capacity(title.len());
    for c in title.chars() {
        let mapped = match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => continue,
            ' ' => '_',
            c if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' => c,
            _ => continue,
        };
        if mapped == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(mapped);
    }

    let mut sanitized = sanitized.trim_matches('_').to_string();

    if sanitized.chars().count() > max_length {
        sanitized = sanitized
            .chars()
            .take(max_length)
            .collect::<String>()
            .trim_end_matches('_')
            .to_string();
    }

    if sanitized.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    sanitized
}

/// Derive a book folder base name from an uploaded file name.
///
/// Uses the file stem, keeps alphanumerics and `._- `, and replaces spaces
/// with underscores. Falls back to `"book"`.
pub fn sanitize_book_name(filename: &str) -> String {
    let base = std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .trim();

    let safe: String = base
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect();
    let safe = safe.trim().replace(' ', "_");

    if safe.is_empty() {
        "book".to_string()
    } else {
        safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Book: A Story"), "My_Book_A_Story");
        assert_eq!(sanitize_filename("Book/Title?"), "BookTitle");
        assert_eq!(sanitize_filename(""), "book_export");
        assert_eq!(sanitize_filename("   "), "book_export");
        assert_eq!(sanitize_filename("!!!"), "book_export");
        assert_eq!(sanitize_filename("  a  b  "), "a_b");
        assert_eq!(sanitize_filename("v1.2-final"), "v1.2-final");
        assert_eq!(sanitize_filename("Café Noir"), "Café_Noir");
    }

    #[test]
    fn test_sanitize_filename_truncates() {
        let long = "a".repeat(250);
        assert_eq!(sanitize_filename(&long).len(), MAX_FILENAME_LEN);
        assert_eq!(sanitize_filename_with_len("abc_def", 4), "abc");
    }

    #[test]
    fn test_sanitize_book_name() {
        assert_eq!(sanitize_book_name("My Novel.epub"), "My_Novel");
        assert_eq!(sanitize_book_name("dir/Some:Book!.epub"), "SomeBook");
        assert_eq!(sanitize_book_name(".epub"), ".epub");
        assert_eq!(sanitize_book_name("???.epub"), "book");
    }
}
