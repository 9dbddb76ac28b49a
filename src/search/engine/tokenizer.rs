//! Text analysis for the embedded engine
//!
//! Approximates the Elasticsearch `standard` analyzer: words are runs of
//! letters and digits, every CJK ideograph or kana is a token of its own,
//! and all tokens are lowercased.

use tantivy::tokenizer::{LowerCaser, TextAnalyzer, Token, TokenStream, Tokenizer};

/// Name under which the analyzer is registered on every embedded index
pub const STANDARD_ANALYZER: &str = "sms_standard";

pub fn standard_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(StandardTokenizer)
        .filter(LowerCaser)
        .build()
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF       // hiragana, katakana
        | 0x3400..=0x4DBF     // extension A
        | 0x4E00..=0x9FFF     // unified ideographs
        | 0xF900..=0xFAFF     // compatibility ideographs
        | 0x20000..=0x2FA1F)  // supplementary planes
}

#[derive(Clone, Default)]
pub struct StandardTokenizer;

pub struct StandardTokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl StandardTokenStream {
    fn push(&mut self, text: &str, from: usize, to: usize) {
        let position = self.tokens.len();
        self.tokens.push(Token {
            offset_from: from,
            offset_to: to,
            position,
            text: text[from..to].to_string(),
            position_length: 1,
        });
    }
}

impl Tokenizer for StandardTokenizer {
    type TokenStream<'a> = StandardTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> StandardTokenStream {
        let mut stream = StandardTokenStream {
            tokens: Vec::new(),
            cursor: 0,
        };
        let mut word_start: Option<usize> = None;

        for (offset, c) in text.char_indices() {
            if is_cjk(c) {
                if let Some(start) = word_start.take() {
                    stream.push(text, start, offset);
                }
                stream.push(text, offset, offset + c.len_utf8());
            } else if c.is_alphanumeric() {
                word_start.get_or_insert(offset);
            } else if let Some(start) = word_start.take() {
                stream.push(text, start, offset);
            }
        }
        if let Some(start) = word_start {
            stream.push(text, start, text.len());
        }

        stream
    }
}

impl TokenStream for StandardTokenStream {
    fn advance(&mut self) -> bool {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.cursor - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.cursor - 1]
    }
}
