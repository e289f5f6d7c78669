//! トークナイザのアダプタ。
//!
//! 言語別の分かち書きは扱わず、Unicode の単語境界で分割する。
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// テキストを単語トークン列に変換する。同じ入力には常に同じ出力を返すこと。
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;

    /// キーワードの部分文字列照合に使う正規化済みテキスト。
    ///
    /// `tokenize` が返すトークンと同じ正規化を適用する必要がある。
    fn normalize(&self, text: &str) -> String {
        text.to_string()
    }
}

fn normalize_text(input: &str) -> String {
    input.nfc().collect::<String>().to_lowercase()
}

#[derive(Debug)]
pub struct WordTokenizer {
    split_re: Regex,
}

impl WordTokenizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            split_re: Regex::new(r"[^\p{L}\p{N}]+").expect("compile word split pattern"),
        }
    }
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        normalize_text(text)
            .split_word_bounds()
            .flat_map(|piece| self.split_re.split(piece))
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    fn normalize(&self, text: &str) -> String {
        normalize_text(text)
    }
}
