//! Greedy word wrapping against a pixel-width measure.

/// Wrapped caption lines plus the vertical metrics derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedLayout {
    pub lines: Vec<String>,
    /// Distance between consecutive baselines.
    pub line_height: f32,
    /// Distance from the first baseline to the last one.
    pub block_height: f32,
}

impl WrappedLayout {
    pub fn new(lines: Vec<String>, line_height: f32) -> Self {
        let block_height = lines.len().saturating_sub(1) as f32 * line_height;
        Self {
            lines,
            line_height,
            block_height,
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Break `phrase` into lines whose measured width stays within `max_width`.
///
/// Words are separated on any whitespace and joined back with single spaces. A word is appended
/// to the current line while the joined candidate still fits; otherwise the line is closed and
/// the word starts a new one. A word that is wider than `max_width` on its own is emitted as a
/// line by itself and overflows.
pub fn wrap(phrase: &str, mut measure: impl FnMut(&str) -> f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in phrase.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }

        let candidate = format!("{current} {word}");
        if measure(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// [`wrap`] plus the vertical metrics used for placement.
pub fn layout_phrase(
    phrase: &str,
    measure: impl FnMut(&str) -> f32,
    max_width: f32,
    line_height: f32,
) -> WrappedLayout {
    WrappedLayout::new(wrap(phrase, measure, max_width), line_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_advance(px_per_char: f32) -> impl FnMut(&str) -> f32 {
        move |s: &str| s.chars().count() as f32 * px_per_char
    }

    #[test]
    fn short_phrase_stays_on_one_line() {
        // "Hello World" is 11 chars -> 180px at ~16.4px/char.
        let measure = |s: &str| if s == "Hello World" { 180.0 } else { 90.0 };
        let lines = wrap("Hello World", measure, 360.0);
        assert_eq!(lines, vec!["Hello World".to_string()]);
    }

    #[test]
    fn long_phrase_wraps_to_several_lines() {
        let phrase = "This is a very long caption that must wrap across multiple lines";
        let lines = wrap(phrase, fixed_advance(16.0), 300.0);
        assert!(lines.len() >= 3, "{lines:?}");
        for line in &lines {
            assert!(line.chars().count() as f32 * 16.0 <= 300.0, "{line}");
        }
        assert_eq!(lines.join(" "), phrase);
    }

    #[test]
    fn multi_word_lines_never_exceed_max_width() {
        let phrases = [
            "a bb ccc dddd eeeee ffffff ggggggg",
            "one two three four five six seven eight nine ten",
            "x",
            "   leading   and   trailing   ",
        ];
        for max in [10.0, 35.0, 50.0, 120.0, 1000.0] {
            for phrase in phrases {
                for line in wrap(phrase, fixed_advance(5.0), max) {
                    let width = line.chars().count() as f32 * 5.0;
                    if line.contains(' ') {
                        assert!(width <= max, "{line:?} at max {max}");
                    }
                }
            }
        }
    }

    #[test]
    fn overlong_word_sits_alone() {
        let lines = wrap("hi supercalifragilistic yo", fixed_advance(10.0), 60.0);
        assert_eq!(
            lines,
            vec![
                "hi".to_string(),
                "supercalifragilistic".to_string(),
                "yo".to_string()
            ]
        );
    }

    #[test]
    fn wrapping_is_deterministic() {
        let phrase = "the quick brown fox jumps over the lazy dog";
        let a = wrap(phrase, fixed_advance(9.0), 100.0);
        let b = wrap(phrase, fixed_advance(9.0), 100.0);
        assert_eq!(a, b);
    }

    #[test]
    fn whitespace_runs_collapse() {
        let lines = wrap("a\t\tb\n c", fixed_advance(1.0), 100.0);
        assert_eq!(lines, vec!["a b c".to_string()]);
        assert!(wrap("   ", fixed_advance(1.0), 100.0).is_empty());
    }

    #[test]
    fn layout_block_height() {
        let layout = layout_phrase("aa bb cc", fixed_advance(10.0), 25.0, 56.0);
        assert_eq!(layout.line_count(), 3);
        assert_eq!(layout.block_height, 112.0);

        let single = layout_phrase("aa", fixed_advance(10.0), 25.0, 56.0);
        assert_eq!(single.block_height, 0.0);
    }
}
