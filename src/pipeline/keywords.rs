//! クラスタごとの高頻度語抽出。
use std::cmp::Reverse;

use rustc_hash::FxHashMap;

use crate::store::models::Document;
use crate::tokenizer::Tokenizer;

/// 上位 k 語とその出現回数。頻度降順、同頻度は語の辞書順。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordTable {
    entries: Vec<(String, u32)>,
}

impl KeywordTable {
    /// 出現回数のマップから上位 `topk` 語を選ぶ。出現0回の語は含めない。
    #[must_use]
    pub fn from_counts(counts: impl IntoIterator<Item = (String, u32)>, topk: usize) -> Self {
        let mut entries: Vec<(String, u32)> =
            counts.into_iter().filter(|(_, count)| *count > 0).collect();
        entries.sort_unstable_by(|(term_a, count_a), (term_b, count_b)| {
            (Reverse(*count_a), term_a).cmp(&(Reverse(*count_b), term_b))
        });
        entries.truncate(topk);
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[(String, u32)] {
        &self.entries
    }

    #[must_use]
    pub fn count(&self, term: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == term)
            .map(|(_, count)| *count)
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(term, _)| term.as_str())
    }

    #[must_use]
    pub fn total_frequency(&self) -> u64 {
        self.entries.iter().map(|(_, count)| u64::from(*count)).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<(String, u32)> {
        self.entries
    }
}

/// 文書群のタイトル＋本文をトークナイズし、上位 `topk` 語を返す。
pub fn top_keywords<'a>(
    documents: impl IntoIterator<Item = &'a Document>,
    tokenizer: &dyn Tokenizer,
    topk: usize,
) -> KeywordTable {
    let mut counts: FxHashMap<String, u32> = FxHashMap::default();
    for document in documents {
        for token in tokenizer.tokenize(&document.text()) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    KeywordTable::from_counts(counts, topk)
}
