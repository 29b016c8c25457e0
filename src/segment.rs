//! Splits story text into display lines and timed words.
//!
//! Both passes are pure: the same text always yields the same lines and the
//! same words with the same character offsets.

/// Default maximum line length, in characters.
pub const DEFAULT_MAX_LINE_CHARS: usize = 12;

/// A display line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Line text, punctuation included.
    pub text: String,
}

/// A highlightable word. Offsets count characters across all lines, which are
/// concatenated without separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// Word text as it appears in its line.
    pub text: String,
    /// Offset of the first character.
    pub start_char: usize,
    /// Offset one past the last character.
    pub end_char: usize,
    /// Line the word sits on.
    pub line_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CharClass {
    Cjk,
    Latin,
    Space,
    Punctuation,
    Other,
}

pub(crate) const fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

const fn is_comma(c: char) -> bool {
    matches!(c, ',' | '，')
}

pub(crate) const fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3400}'..='\u{4dbf}'
        | '\u{4e00}'..='\u{9fff}'
        | '\u{f900}'..='\u{faff}'
        | '\u{20000}'..='\u{2a6df}')
}

pub(crate) fn classify(c: char) -> CharClass {
    match c {
        c if is_cjk(c) => CharClass::Cjk,
        '.' | ',' | '!' | '?' | ';' | ':' | '。' | '，' | '！' | '？' | '、' | '；' | '：' => {
            CharClass::Punctuation
        }
        c if c.is_whitespace() => CharClass::Space,
        c if c.is_ascii_alphanumeric() => CharClass::Latin,
        c if c.is_alphanumeric() && !c.is_ascii() => {
            // accented Latin, Cyrillic and the like read as run characters
            CharClass::Latin
        }
        _ => CharClass::Other,
    }
}

pub(crate) fn has_latin_letter(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

struct LineBuffer {
    max_chars: usize,
    current: String,
    lines: Vec<Line>,
}

impl LineBuffer {
    const fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            current: String::new(),
            lines: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.lines.push(Line {
                text: std::mem::take(&mut self.current),
            });
        }
    }

    fn push_word(&mut self, word: &str) {
        let len = char_len(&self.current);
        if len > 0 && len.saturating_add(char_len(word)).saturating_add(1) > self.max_chars {
            self.flush();
        }
        if !self.current.is_empty() {
            self.current.push(' ');
        }
        self.current.push_str(word);
    }

    fn push_piece(&mut self, piece: &str) {
        let len = char_len(&self.current);
        if len > 0 && len.saturating_add(char_len(piece)) > self.max_chars {
            self.flush();
        }
        self.current.push_str(piece);
    }

    fn push_part(&mut self, part: &str) {
        if has_latin_letter(part) {
            for word in part.split_whitespace() {
                self.push_word(word);
            }
        } else if char_len(part) > self.max_chars {
            for piece in split_keep(part, is_comma) {
                if !piece.is_empty() {
                    self.push_piece(piece);
                }
            }
        } else {
            self.push_piece(part);
        }
    }
}

/// Splits `text` around every char matching `sep`, keeping each separator as
/// its own one-char piece.
fn split_keep(text: &str, sep: impl Fn(char) -> bool) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (at, c) in text.char_indices() {
        if sep(c) {
            pieces.push(&text[start..at]);
            let end = at.saturating_add(c.len_utf8());
            pieces.push(&text[at..end]);
            start = end;
        }
    }
    pieces.push(&text[start..]);
    pieces
}

/// Splits story text into display lines of at most `max_chars` characters
/// where word boundaries allow.
///
/// Sentence terminators stay attached to the preceding content and end the
/// line. Text that yields no lines comes back as a single line holding the
/// raw input.
pub fn segment_lines(text: &str, max_chars: usize) -> Vec<Line> {
    let mut buffer = LineBuffer::new(max_chars);

    for part in split_keep(text, is_terminator) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if part.chars().all(is_terminator) {
            buffer.current.push_str(part);
            buffer.flush();
        } else {
            buffer.push_part(part);
        }
    }
    buffer.flush();

    if buffer.lines.is_empty() {
        return vec![Line {
            text: text.to_string(),
        }];
    }
    buffer.lines
}

struct WordScanner {
    words: Vec<Word>,
    run: String,
    run_start: usize,
    line_first_word: usize,
}

impl WordScanner {
    fn flush_run(&mut self, end_char: usize, line_index: usize) {
        if !self.run.is_empty() {
            self.words.push(Word {
                text: std::mem::take(&mut self.run),
                start_char: self.run_start,
                end_char,
                line_index,
            });
        }
    }
}

/// Splits display lines into highlightable words.
///
/// CJK ideographs are one word each, Latin/digit runs form one word, and
/// punctuation attaches to the word it follows on the same line. Punctuation
/// with nothing to attach to is dropped.
pub fn segment_words(lines: &[Line]) -> Vec<Word> {
    let mut scanner = WordScanner {
        words: Vec::new(),
        run: String::new(),
        run_start: 0,
        line_first_word: 0,
    };
    let mut offset = 0usize;

    for (line_index, line) in lines.iter().enumerate() {
        scanner.line_first_word = scanner.words.len();

        for c in line.text.chars() {
            let next = offset.saturating_add(1);
            match classify(c) {
                CharClass::Cjk => {
                    scanner.flush_run(offset, line_index);
                    scanner.words.push(Word {
                        text: c.to_string(),
                        start_char: offset,
                        end_char: next,
                        line_index,
                    });
                }
                CharClass::Latin | CharClass::Other => {
                    if scanner.run.is_empty() {
                        scanner.run_start = offset;
                    }
                    scanner.run.push(c);
                }
                CharClass::Space => scanner.flush_run(offset, line_index),
                CharClass::Punctuation => {
                    if !scanner.run.is_empty() {
                        scanner.run.push(c);
                        scanner.flush_run(next, line_index);
                    } else if scanner.words.len() > scanner.line_first_word
                        && let Some(last) = scanner.words.last_mut()
                    {
                        last.text.push(c);
                        last.end_char = next;
                    }
                }
            }
            offset = next;
        }

        scanner.flush_run(offset, line_index);
    }

    scanner.words
}
