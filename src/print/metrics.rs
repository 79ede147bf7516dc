//! Helvetica glyph metrics and WinAnsi text encoding.

/// Widths of `' '..='~'` in Helvetica, thousandths of an em.
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Width used for glyphs outside the ASCII table.
const DEFAULT_WIDTH: u16 = 556;

/// Bold glyphs are wider; widen uniformly rather than carry a second table.
const BOLD_FACTOR: f32 = 1.08;

/// Advance width of `c` in thousandths of an em.
pub fn char_width(c: char) -> u16 {
    match c {
        ' '..='~' => HELVETICA_ASCII[c as usize - 0x20],
        '\u{a0}' => 278,
        _ => DEFAULT_WIDTH,
    }
}

/// Width of `text` in points at `size`.
pub fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(char_width(c))).sum();
    let width = units as f32 * size / 1000.0;
    if bold { width * BOLD_FACTOR } else { width }
}

/// WinAnsi code points above 0x7F that differ from Latin-1.
const WIN_ANSI_EXTRA: &[(char, u8)] = &[
    ('€', 0x80),
    ('‚', 0x82),
    ('ƒ', 0x83),
    ('„', 0x84),
    ('…', 0x85),
    ('†', 0x86),
    ('‡', 0x87),
    ('ˆ', 0x88),
    ('‰', 0x89),
    ('Š', 0x8A),
    ('‹', 0x8B),
    ('Œ', 0x8C),
    ('Ž', 0x8E),
    ('‘', 0x91),
    ('’', 0x92),
    ('“', 0x93),
    ('”', 0x94),
    ('•', 0x95),
    ('–', 0x96),
    ('—', 0x97),
    ('˜', 0x98),
    ('™', 0x99),
    ('š', 0x9A),
    ('›', 0x9B),
    ('œ', 0x9C),
    ('ž', 0x9E),
    ('Ÿ', 0x9F),
];

/// Encode text for a WinAnsi simple font. Unmappable characters become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u8,
            _ => WIN_ANSI_EXTRA
                .iter()
                .find(|(ch, _)| *ch == c)
                .map(|(_, b)| *b)
                .unwrap_or(b'?'),
        })
        .collect()
}

/// Break `text` into lines no wider than `max_width` points.
///
/// Greedy, word based; `\n` forces a break and words longer than a line are
/// split between characters.
pub fn wrap(text: &str, size: f32, bold: bool, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();

    for hard_line in text.split('\n') {
        let mut current = String::new();

        for word in hard_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };

            if text_width(&candidate, size, bold) <= max_width {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }

            if text_width(word, size, bold) <= max_width {
                current = word.to_string();
            } else {
                for c in word.chars() {
                    current.push(c);
                    if text_width(&current, size, bold) > max_width && current.chars().count() > 1 {
                        current.pop();
                        lines.push(std::mem::replace(&mut current, c.to_string()));
                    }
                }
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_widths() {
        assert_eq!(char_width(' '), 278);
        assert_eq!(char_width('A'), 667);
        assert_eq!(char_width('W'), 944);
        assert_eq!(char_width('i'), 222);
        assert_eq!(char_width('~'), 584);
        assert_eq!(char_width('字'), DEFAULT_WIDTH);
        assert!((text_width("AA", 10.0, false) - 13.34).abs() < 0.001);
        assert!(text_width("AA", 10.0, true) > text_width("AA", 10.0, false));
    }

    #[test]
    fn win_ansi_encoding() {
        assert_eq!(encode_win_ansi("Abc"), b"Abc");
        assert_eq!(encode_win_ansi("café"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(encode_win_ansi("“hi”—€"), vec![0x93, b'h', b'i', 0x94, 0x97, 0x80]);
        assert_eq!(encode_win_ansi("日本"), b"??");
    }

    #[test]
    fn wrap_respects_width() {
        let text = "the quick brown fox jumps over the lazy dog ".repeat(10);
        let lines = wrap(&text, 11.0, false, 200.0);

        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, 11.0, false) <= 200.0);
        }
        let rejoined = lines.join(" ");
        assert_eq!(rejoined.split_whitespace().count(), text.split_whitespace().count());
    }

    #[test]
    fn wrap_hard_breaks_and_long_words() {
        assert_eq!(wrap("a\nb", 11.0, false, 500.0), vec!["a", "b"]);
        assert!(wrap("   ", 11.0, false, 500.0).is_empty());

        let long = "x".repeat(200);
        let lines = wrap(&long, 11.0, false, 100.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), long);
    }
}
