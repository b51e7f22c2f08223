
// imports
use std::collections::HashSet;
use std::slice::Split;

/// POS tags whose words may become basis dimensions.
pub const BASIS_POS: [&str; 4] = ["NN", "JJ", "VV", "RB"];

/// POS tags accepted for a subject or an object.
pub const ARGUMENT_POS: [&str; 2] = ["NN", "JJ"];

pub const VERB_POS: &str = "VV";
pub const SUBJECT_REL: &str = "SBJ";
pub const OBJECT_REL: &str = "OBJ";

const SENTENCE_START: &[u8] = b"<s>";
const SENTENCE_STOP: &[u8] = b"</s>";

/// How words are read off a token line.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub lemma_time: bool,
    pub ignores: HashSet<String>,
}

impl ScanOptions {

    /// The lower-cased word of a token if it may be counted.
    pub fn word(&self, token: &Token) -> Option<String> {
        let word = token.form(self.lemma_time)?;
        if is_printable_ascii(&word) && !self.ignores.contains(&word) {
            Some(word)
        } else {
            None
        }
    }
}

/// One whitespace-delimited line of the parsed corpus:
/// surface, lemma, POS, self-index, head-index, relation.
#[derive(Clone, Debug)]
pub struct Token<'a> {
    cols: Vec<&'a [u8]>,
}

impl<'a> Token<'a> {

    pub fn parse(line: &'a [u8]) -> Self {
        Self {
            cols: line
                .split(|b| b.is_ascii_whitespace())
                .filter(|col| !col.is_empty())
                .collect(),
        }
    }

    pub fn columns(&self) -> usize {
        self.cols.len()
    }

    fn text(&self, i: usize) -> Option<&'a str> {
        self.cols.get(i).and_then(|col| std::str::from_utf8(col).ok())
    }

    pub fn surface(&self) -> Option<&'a str> {
        self.text(0)
    }

    pub fn lemma(&self) -> Option<&'a str> {
        self.text(1)
    }

    pub fn pos(&self) -> Option<&'a str> {
        self.text(2)
    }

    pub fn index(&self) -> Option<usize> {
        self.text(3).and_then(|s| s.parse().ok())
    }

    pub fn head(&self) -> Option<usize> {
        self.text(4).and_then(|s| s.parse().ok())
    }

    pub fn relation(&self) -> Option<&'a str> {
        self.text(5)
    }

    /// Surface or lemma column, lower-cased.
    pub fn form(&self, lemma_time: bool) -> Option<String> {
        let form = if lemma_time { self.lemma() } else { self.surface() };
        form.map(|s| s.to_lowercase())
    }

    pub fn pos_in(&self, tags: &[&str]) -> bool {
        self.pos().map_or(false, |pos| tags.iter().any(|tag| pos.contains(tag)))
    }

    pub fn is_verb(&self) -> bool {
        self.pos_in(&[VERB_POS])
    }

    pub fn relation_is(&self, rel: &str) -> bool {
        self.relation().map_or(false, |r| r.contains(rel))
    }

    /// True when the line carries all six dependency columns with numeric indices.
    pub fn is_dependency(&self) -> bool {
        self.columns() > 5 && self.index().is_some() && self.head().is_some()
    }

    fn first_contains(&self, marker: &[u8]) -> bool {
        self.cols.first().map_or(false, |col| {
            col.windows(marker.len()).any(|w| w.eq_ignore_ascii_case(marker))
        })
    }
}

pub fn is_printable_ascii(word: &str) -> bool {
    word.bytes().all(|b| (32..=126).contains(&b))
}

fn is_line_end(b: &u8) -> bool {
    *b == b'\n' || *b == b'\r'
}

/// Non-empty lines of a block.
pub fn lines(block: &[u8]) -> impl Iterator<Item = &[u8]> {
    block.split(is_line_end as fn(&u8) -> bool).filter(|line| !line.is_empty())
}

/// Sentences of a block: the token lines between `<s>` and `</s>` having at least
/// `min_columns` columns. A sentence left open at the end of the block is dropped.
pub struct Sentences<'a> {
    lines: Split<'a, u8, fn(&u8) -> bool>,
    min_columns: usize,
}

impl<'a> Sentences<'a> {
    pub fn new(block: &'a [u8], min_columns: usize) -> Self {
        Self {
            lines: block.split(is_line_end as fn(&u8) -> bool),
            min_columns,
        }
    }
}

impl<'a> Iterator for Sentences<'a> {
    type Item = Vec<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {

        let mut recording = false;
        let mut sentence = Vec::new();

        for line in self.lines.by_ref() {
            let token = Token::parse(line);
            if token.columns() == 0 {
                continue;
            }

            if token.first_contains(SENTENCE_STOP) {
                if recording {
                    return Some(sentence);
                }
            } else if token.first_contains(SENTENCE_START) {
                recording = true;
                sentence.clear();
            } else if recording && token.columns() >= self.min_columns {
                sentence.push(token);
            }
        }

        None
    }
}


#[cfg(test)]
mod tests {

    use super::{lines, ScanOptions, Sentences, Token};
    use crate::config::DEFAULT_IGNORES;

    const TEXT: &str = "<text id=1>\n<s>\nThe\tthe\tDT\t1\t2\tNMOD\nCats\tcat\tNNS\t2\t3\tSBJ\r\nsat\tsit\tVVD\t3\t0\tROOT\n.\t.\tSENT\t4\t3\tP\n</s>\nstray\tstray\tJJ\t1\t0\tROOT\n<s>\nbroken\n</s>\n<s>\nopen\topen\tVV\t1\t0\tROOT\n";

    #[test]
    fn token_columns() {

        let token = Token::parse(b"Cats\tcat\tNNS\t2\t3\tSBJ");
        assert_eq!(token.surface(), Some("Cats"));
        assert_eq!(token.form(false).as_deref(), Some("cats"));
        assert_eq!(token.form(true).as_deref(), Some("cat"));
        assert_eq!(token.index(), Some(2));
        assert_eq!(token.head(), Some(3));
        assert!(token.pos_in(&["NN", "JJ"]));
        assert!(token.relation_is("SBJ"));
        assert!(token.is_dependency());

        let short = Token::parse(b"sat sit VVD x");
        assert!(!short.is_dependency());
        assert_eq!(short.index(), None);
        assert!(short.is_verb());
    }

    #[test]
    fn sentences_skip_outside_lines() {

        let sentences: Vec<Vec<Token>> = Sentences::new(TEXT.as_bytes(), 2).collect();
        assert_eq!(sentences.len(), 2);
        let words: Vec<&str> = sentences[0].iter().filter_map(|t| t.lemma()).collect();
        assert_eq!(words, vec!["the", "cat", "sit", "."]);
        assert!(sentences[1].is_empty());

        assert_eq!(lines(TEXT.as_bytes()).count(), 13);
    }

    #[test]
    fn word_filters() {

        let options = ScanOptions {
            lemma_time: true,
            ignores: DEFAULT_IGNORES.iter().map(|w| w.to_string()).collect(),
        };
        assert_eq!(options.word(&Token::parse(b"Cats cat NNS")).as_deref(), Some("cat"));
        assert_eq!(options.word(&Token::parse(b". . SENT")), None);
        assert_eq!(options.word(&Token::parse("Café café NN".as_bytes())), None);
        assert_eq!(options.word(&Token::parse(b"Cats")), None);
    }
}
