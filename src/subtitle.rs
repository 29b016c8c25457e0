//! Word-synchronised subtitle state.
//!
//! The view owns one unit per display line and per word and exposes a single
//! mutation, [`SubtitleView::highlight_word`]. Front-ends only read it.

use {
    crate::{
        config::SubtitleConfig,
        segment::{self, Word},
        session::PlayToken,
    },
    std::ops::Range,
};

/// A word of the subtitle and its highlight state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordUnit {
    /// Text and position of the word.
    pub word: Word,
    /// A separating space is drawn before this word.
    pub space_before: bool,
    /// This word is being spoken.
    pub current: bool,
    /// Narration has passed this word.
    pub spoken: bool,
}

/// A subtitle line and the words it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineUnit {
    /// The line as shown.
    pub text: String,
    /// Indices into [`SubtitleView::words`].
    pub words: Range<usize>,
}

/// First line of the window that shows `target`, keeping `size` lines in view.
///
/// The window opens one line above the target and is pulled back so it never
/// runs past the last line.
pub fn visible_window(target: usize, line_count: usize, size: usize) -> Range<usize> {
    let mut start = target.saturating_sub(1);
    if start.saturating_add(size) > line_count {
        start = line_count.saturating_sub(size);
    }
    let end = start.saturating_add(size).min(line_count);
    start..end
}

fn needs_space(previous: &Word, next: &Word) -> bool {
    previous.line_index == next.line_index
        && (segment::has_latin_letter(&previous.text) || segment::has_latin_letter(&next.text))
}

/// The subtitle of one session: its lines, its words and which of them are
/// in view and highlighted.
#[derive(Debug, Clone)]
pub struct SubtitleView {
    token: PlayToken,
    lines: Vec<LineUnit>,
    words: Vec<WordUnit>,
    active_line: Option<usize>,
    window: Range<usize>,
    window_size: usize,
}

impl SubtitleView {
    /// Segments `text` and builds the units for the session `token`.
    pub fn build(token: PlayToken, text: &str, config: &SubtitleConfig) -> Self {
        let lines = segment::segment_lines(text, config.max_line_chars);
        let words = segment::segment_words(&lines);

        let mut units: Vec<WordUnit> = Vec::with_capacity(words.len());
        for word in words {
            let space_before = units
                .last()
                .is_some_and(|prev| needs_space(&prev.word, &word));
            units.push(WordUnit {
                word,
                space_before,
                current: false,
                spoken: false,
            });
        }

        let line_units = lines
            .into_iter()
            .enumerate()
            .map(|(index, line)| {
                let start = units.partition_point(|u| u.word.line_index < index);
                let end = units.partition_point(|u| u.word.line_index <= index);
                LineUnit {
                    text: line.text,
                    words: start..end,
                }
            })
            .collect::<Vec<_>>();

        let window_size = config.visible_lines.max(1);
        let window = visible_window(0, line_units.len(), window_size);

        Self {
            token,
            lines: line_units,
            words: units,
            active_line: None,
            window,
            window_size,
        }
    }

    /// Moves the highlight to word `index`.
    ///
    /// Returns `false` without touching anything when `token` is not the
    /// session this view was built for. Otherwise every flag is recomputed:
    /// the word becomes current, all earlier words are spoken, and its line
    /// becomes active and visible. An out-of-range index only clears.
    pub fn highlight_word(&mut self, token: PlayToken, index: usize) -> bool {
        if token != self.token {
            return false;
        }

        for unit in &mut self.words {
            unit.current = false;
            unit.spoken = false;
        }

        let Some(line) = self.words.get(index).map(|u| u.word.line_index) else {
            return true;
        };

        for unit in &mut self.words[..index] {
            unit.spoken = true;
        }
        if let Some(unit) = self.words.get_mut(index) {
            unit.current = true;
        }

        if self.active_line != Some(line) {
            self.active_line = Some(line);
            self.window = visible_window(line, self.lines.len(), self.window_size);
        }
        true
    }

    /// Clears every flag and the active line.
    pub fn reset(&mut self) {
        for unit in &mut self.words {
            unit.current = false;
            unit.spoken = false;
        }
        self.active_line = None;
        self.window = visible_window(0, self.lines.len(), self.window_size);
    }

    /// Session the view was built for.
    pub const fn token(&self) -> PlayToken {
        self.token
    }

    /// Every line of the story.
    pub fn lines(&self) -> &[LineUnit] {
        &self.lines
    }

    /// Every word of the story, in reading order.
    pub fn words(&self) -> &[WordUnit] {
        &self.words
    }

    /// Number of highlightable words.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Line of the current word, once a word has been highlighted.
    pub const fn active_line(&self) -> Option<usize> {
        self.active_line
    }

    /// Lines currently in view.
    pub fn window(&self) -> Range<usize> {
        self.window.clone()
    }

    /// Index of the word being spoken.
    pub fn current_word(&self) -> Option<usize> {
        self.words.iter().position(|u| u.current)
    }

    /// Visible lines with their index and word units, top to bottom.
    pub fn visible_lines(&self) -> impl Iterator<Item = (usize, &LineUnit, &[WordUnit])> {
        self.window.clone().filter_map(move |index| {
            let line = self.lines.get(index)?;
            let words = self.words.get(line.words.clone())?;
            Some((index, line, words))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(unused, clippy::missing_panics_doc, clippy::arithmetic_side_effects)]
    use {super::*, crate::session::TokenSource, assert2::check as assert};

    const STORY: &str = "The cat sat. It ran so fast! Then it slept. The end.";

    fn view() -> (SubtitleView, PlayToken) {
        let mut tokens = TokenSource::default();
        let token = tokens.mint();
        (
            SubtitleView::build(token, STORY, &SubtitleConfig::default()),
            token,
        )
    }

    fn flags(view: &SubtitleView) -> Vec<(bool, bool)> {
        view.words().iter().map(|u| (u.current, u.spoken)).collect()
    }

    #[test]
    fn test_window_positions() {
        assert!(visible_window(0, 5, 2) == (0..2));
        assert!(visible_window(1, 5, 2) == (0..2));
        assert!(visible_window(3, 5, 2) == (2..4));
        assert!(visible_window(4, 5, 2) == (3..5));
        assert!(visible_window(0, 1, 2) == (0..1));
        assert!(visible_window(0, 0, 2) == (0..0));
    }

    #[test]
    fn test_build_groups_words_by_line() {
        let (view, _) = view();
        let texts: Vec<_> = view.lines().iter().map(|l| l.text.as_str()).collect();
        assert!(texts == ["The cat sat.", "It ran so", "fast!", "Then it", "slept.", "The end."]);

        let second = &view.lines()[1];
        let words: Vec<_> = view.words()[second.words.clone()]
            .iter()
            .map(|u| u.word.text.as_str())
            .collect();
        assert!(words == ["It", "ran", "so"]);
        assert!(!view.words()[0].space_before);
        assert!(view.words()[1].space_before);
        assert!(!view.words()[3].space_before);
    }

    #[test]
    fn test_cjk_words_have_no_spaces() {
        let view = SubtitleView::build(PlayToken::default(), "小猫睡觉了。", &SubtitleConfig::default());
        assert!(view.words().iter().all(|u| !u.space_before));
    }

    #[test]
    fn test_highlight_marks_current_and_spoken() {
        let (mut view, token) = view();
        assert!(view.highlight_word(token, 4));

        let f = flags(&view);
        assert!(f[..4].iter().all(|&(current, spoken)| !current && spoken));
        assert!(f[4] == (true, false));
        assert!(f[5..].iter().all(|&(current, spoken)| !current && !spoken));
        assert!(view.active_line() == Some(1));
        assert!(view.window() == (0..2));
    }

    #[test]
    fn test_highlight_moves_window_with_active_line() {
        let (mut view, token) = view();
        // "Then" starts line 3
        let then = view.lines()[3].words.start;
        view.highlight_word(token, then);
        assert!(view.active_line() == Some(3));
        assert!(view.window() == (2..4));

        let last = view.word_count() - 1;
        view.highlight_word(token, last);
        assert!(view.window() == (4..6));
        let shown: Vec<_> = view.visible_lines().map(|(i, _, _)| i).collect();
        assert!(shown == [4, 5]);
    }

    #[test]
    fn test_highlighting_backwards_leaves_no_later_word_spoken() {
        let (mut view, token) = view();
        for (i, j) in [(9, 2), (5, 0), (3, 2), (10, 9)] {
            view.highlight_word(token, i);
            view.highlight_word(token, j);
            assert!(view.words()[j + 1..].iter().all(|u| !u.spoken && !u.current));
            assert!(view.current_word() == Some(j));
        }
    }

    #[test]
    fn test_out_of_range_only_clears() {
        let (mut view, token) = view();
        view.highlight_word(token, 6);
        let window = view.window();
        let active = view.active_line();

        assert!(view.highlight_word(token, 999));
        assert!(flags(&view).iter().all(|&f| f == (false, false)));
        assert!(view.window() == window);
        assert!(view.active_line() == active);
    }

    #[test]
    fn test_stale_token_is_a_noop() {
        let mut tokens = TokenSource::default();
        let old = tokens.mint();
        let current = tokens.mint();
        let mut view = SubtitleView::build(current, STORY, &SubtitleConfig::default());
        view.highlight_word(current, 2);
        let before = flags(&view);

        for i in 0..view.word_count() {
            assert!(!view.highlight_word(old, i));
        }
        assert!(flags(&view) == before);
        assert!(view.active_line() == Some(0));
    }

    #[test]
    fn test_reset_clears_everything() {
        let (mut view, token) = view();
        view.highlight_word(token, 8);
        view.reset();
        assert!(flags(&view).iter().all(|&f| f == (false, false)));
        assert!(view.active_line().is_none());
        assert!(view.window() == (0..2));
    }
}
