//! Rank- and size-based cluster demotion.
//!
//! Each filter first computes a full plan from an immutable view of the clusters
//! and then builds a new [`ClusterSet`]; nothing is mutated while iterating.

use std::collections::BTreeMap;

use aho_corasick::AhoCorasick;
use tracing::{debug, info};

use crate::error::ClusteringError;
use crate::store::models::{ClusterId, Document, Label};
use crate::tokenizer::Tokenizer;

use super::keywords::KeywordTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurationParams {
    /// Highest-scoring clusters left untouched.
    pub top_num: usize,
    /// Lowest-scoring clusters demoted entirely.
    pub last_num: usize,
    /// Clusters smaller than this are demoted after rank filtering.
    pub least_size: usize,
}

impl Default for CurationParams {
    fn default() -> Self {
        Self {
            top_num: 5,
            last_num: 2,
            least_size: 5,
        }
    }
}

/// Cluster → members mapping with an always-present other bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterSet {
    clusters: BTreeMap<ClusterId, Vec<Document>>,
    other: Vec<Document>,
}

impl ClusterSet {
    /// Groups documents by label; unlabeled documents land in the other bucket.
    #[must_use]
    pub fn from_labeled(documents: Vec<Document>) -> Self {
        let mut set = Self::default();
        for document in documents {
            match document.label.and_then(|label| label.cluster_id()) {
                Some(id) => set.clusters.entry(id).or_default().push(document),
                None => set.push_other(document),
            }
        }
        set
    }

    fn push_other(&mut self, mut document: Document) {
        document.label = Some(Label::Other);
        self.other.push(document);
    }

    #[must_use]
    pub fn clusters(&self) -> &BTreeMap<ClusterId, Vec<Document>> {
        &self.clusters
    }

    #[must_use]
    pub fn other(&self) -> &[Document] {
        &self.other
    }

    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        self.clusters.values().map(Vec::len).sum::<usize>() + self.other.len()
    }

    /// Final label → members mapping. `Label::Other` is always present.
    #[must_use]
    pub fn into_label_map(self) -> BTreeMap<Label, Vec<Document>> {
        let mut map: BTreeMap<Label, Vec<Document>> = self
            .clusters
            .into_iter()
            .map(|(id, members)| (Label::Cluster(id), members))
            .collect();
        map.insert(Label::Other, self.other);
        map
    }

    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        self.clusters
            .into_values()
            .flatten()
            .chain(self.other)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemotionSummary {
    pub clusters_removed: usize,
    pub documents_demoted: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurationOutcome {
    pub clusters: ClusterSet,
    pub by_rank: DemotionSummary,
    pub by_size: DemotionSummary,
}

/// Runs rank-based demotion followed by size-based demotion.
///
/// # Errors
/// Returns [`ClusteringError::InsufficientClusters`] when there are fewer than
/// `top_num + last_num` clusters.
pub fn curate(
    set: ClusterSet,
    scores: &BTreeMap<ClusterId, f64>,
    keywords: &BTreeMap<ClusterId, KeywordTable>,
    params: &CurationParams,
    tokenizer: &dyn Tokenizer,
) -> Result<CurationOutcome, ClusteringError> {
    let (set, by_rank) = demote_by_rank(set, scores, keywords, params, tokenizer)?;
    let (clusters, by_size) = demote_by_size(set, params.least_size);
    Ok(CurationOutcome {
        clusters,
        by_rank,
        by_size,
    })
}

enum Verdict {
    Keep,
    DemoteAll,
    /// Per-member keep flags, in member order.
    Filter(Vec<bool>),
}

/// Clusters ordered by score descending; equal scores fall back to id order.
fn rank(set: &ClusterSet, scores: &BTreeMap<ClusterId, f64>) -> Vec<ClusterId> {
    let mut ranked: Vec<ClusterId> = set.clusters.keys().copied().collect();
    let score = |id: &ClusterId| scores.get(id).copied().unwrap_or(0.0);
    ranked.sort_by(|a, b| score(b).total_cmp(&score(a)).then_with(|| a.cmp(b)));
    ranked
}

/// Demotes the bottom `last_num` clusters and re-validates the middle ones
/// against their own keywords.
///
/// # Errors
/// Returns [`ClusteringError::InsufficientClusters`] when there are fewer than
/// `top_num + last_num` clusters.
pub fn demote_by_rank(
    set: ClusterSet,
    scores: &BTreeMap<ClusterId, f64>,
    keywords: &BTreeMap<ClusterId, KeywordTable>,
    params: &CurationParams,
    tokenizer: &dyn Tokenizer,
) -> Result<(ClusterSet, DemotionSummary), ClusteringError> {
    let cluster_count = set.cluster_count();
    let required = params.top_num + params.last_num;
    if cluster_count < required {
        return Err(ClusteringError::InsufficientClusters {
            found: cluster_count,
            required,
        });
    }

    let ranked = rank(&set, scores);
    let bottom_start = cluster_count - params.last_num;
    let empty = KeywordTable::default();

    let mut plan: BTreeMap<ClusterId, Verdict> = BTreeMap::new();
    for (position, id) in ranked.iter().enumerate() {
        let verdict = if position >= bottom_start {
            Verdict::DemoteAll
        } else if position >= params.top_num {
            let matcher = KeywordMatcher::new(keywords.get(id).unwrap_or(&empty));
            let flags = set.clusters[id]
                .iter()
                .map(|document| matcher.matches(&tokenizer.normalize(&document.text())))
                .collect();
            Verdict::Filter(flags)
        } else {
            Verdict::Keep
        };
        plan.insert(*id, verdict);
    }

    let mut summary = DemotionSummary::default();
    let mut rebuilt = ClusterSet {
        clusters: BTreeMap::new(),
        other: set.other,
    };
    for (id, members) in set.clusters {
        match plan.remove(&id).unwrap_or(Verdict::Keep) {
            Verdict::Keep => {
                rebuilt.clusters.insert(id, members);
            }
            Verdict::DemoteAll => {
                summary.clusters_removed += 1;
                summary.documents_demoted += members.len();
                debug!(cluster_id = %id, members = members.len(), "demoting bottom-ranked cluster");
                for document in members {
                    rebuilt.push_other(document);
                }
            }
            Verdict::Filter(flags) => {
                let mut kept = Vec::with_capacity(members.len());
                for (document, keep) in members.into_iter().zip(flags) {
                    if keep {
                        kept.push(document);
                    } else {
                        summary.documents_demoted += 1;
                        rebuilt.push_other(document);
                    }
                }
                if kept.is_empty() {
                    summary.clusters_removed += 1;
                } else {
                    rebuilt.clusters.insert(id, kept);
                }
            }
        }
    }

    info!(
        clusters_before = cluster_count,
        clusters_after = rebuilt.cluster_count(),
        documents_demoted = summary.documents_demoted,
        top_num = params.top_num,
        last_num = params.last_num,
        "rank-based demotion completed"
    );
    Ok((rebuilt, summary))
}

/// Demotes every cluster with fewer than `least_size` members.
#[must_use]
pub fn demote_by_size(set: ClusterSet, least_size: usize) -> (ClusterSet, DemotionSummary) {
    let undersized: Vec<ClusterId> = set
        .clusters
        .iter()
        .filter(|(_, members)| members.len() < least_size)
        .map(|(id, _)| *id)
        .collect();

    let mut summary = DemotionSummary::default();
    let mut rebuilt = ClusterSet {
        clusters: BTreeMap::new(),
        other: set.other,
    };
    for (id, members) in set.clusters {
        if undersized.contains(&id) {
            summary.clusters_removed += 1;
            summary.documents_demoted += members.len();
            for document in members {
                rebuilt.push_other(document);
            }
        } else {
            rebuilt.clusters.insert(id, members);
        }
    }

    info!(
        least_size,
        clusters_removed = summary.clusters_removed,
        documents_demoted = summary.documents_demoted,
        "size-based demotion completed"
    );
    (rebuilt, summary)
}

/// Literal substring match of any keyword.
struct KeywordMatcher<'a> {
    automaton: Option<AhoCorasick>,
    terms: Vec<&'a str>,
}

impl<'a> KeywordMatcher<'a> {
    fn new(table: &'a KeywordTable) -> Self {
        let terms: Vec<&str> = table.terms().collect();
        let automaton = AhoCorasick::new(&terms).ok();
        Self { automaton, terms }
    }

    fn matches(&self, text: &str) -> bool {
        match &self.automaton {
            Some(automaton) => automaton.is_match(text),
            None => self.terms.iter().any(|term| text.contains(term)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::tokenizer::WordTokenizer;

    struct Fixture {
        ids: Vec<ClusterId>,
        set: ClusterSet,
        scores: BTreeMap<ClusterId, f64>,
        keywords: BTreeMap<ClusterId, KeywordTable>,
    }

    /// `clusters[i]` = (score, keywords, member texts). Ids are sorted so that
    /// index order equals id order.
    fn fixture(clusters: &[(f64, &[&str], &[&str])]) -> Fixture {
        let mut ids: Vec<ClusterId> = clusters.iter().map(|_| ClusterId::new_random()).collect();
        ids.sort();

        let mut documents = Vec::new();
        let mut scores = BTreeMap::new();
        let mut keywords = BTreeMap::new();
        for (id, (score, words, texts)) in ids.iter().zip(clusters) {
            scores.insert(*id, *score);
            keywords.insert(
                *id,
                KeywordTable::from_counts(words.iter().map(|w| ((*w).to_string(), 20)), 20),
            );
            for (n, text) in texts.iter().enumerate() {
                let mut doc = Document::new(format!("{id}-{n}"), "", *text, Utc::now());
                doc.label = Some(Label::Cluster(*id));
                documents.push(doc);
            }
        }

        Fixture {
            ids,
            set: ClusterSet::from_labeled(documents),
            scores,
            keywords,
        }
    }

    fn params(top_num: usize, last_num: usize, least_size: usize) -> CurationParams {
        CurationParams {
            top_num,
            last_num,
            least_size,
        }
    }

    #[test]
    fn too_few_clusters_is_an_error() {
        let f = fixture(&[(1.0, &["a"], &["a"]), (0.5, &["b"], &["b"])]);
        let error = demote_by_rank(f.set, &f.scores, &f.keywords, &params(2, 1, 1), &WordTokenizer::new())
            .unwrap_err();
        assert!(matches!(
            error,
            ClusteringError::InsufficientClusters {
                found: 2,
                required: 3
            }
        ));
    }

    #[test]
    fn bottom_clusters_are_demoted_entirely() {
        let f = fixture(&[
            (3.0, &["apec"], &["apec one"]),
            (2.0, &["trade"], &["trade two"]),
            (1.0, &["weather"], &["weather three", "weather four"]),
        ]);

        let (set, summary) =
            demote_by_rank(f.set, &f.scores, &f.keywords, &params(2, 1, 1), &WordTokenizer::new())
                .unwrap();

        assert_eq!(set.cluster_count(), 2);
        assert!(!set.clusters().contains_key(&f.ids[2]));
        assert_eq!(set.other().len(), 2);
        assert!(set.other().iter().all(|d| d.label == Some(Label::Other)));
        assert_eq!(
            summary,
            DemotionSummary {
                clusters_removed: 1,
                documents_demoted: 2
            }
        );
    }

    #[test]
    fn middle_clusters_keep_only_keyword_hits() {
        let f = fixture(&[
            (3.0, &["apec"], &["no keyword here"]),
            (2.0, &["summit"], &["the SUMMIT opened", "unrelated story"]),
            (1.0, &["x"], &["x"]),
        ]);

        let (set, summary) =
            demote_by_rank(f.set, &f.scores, &f.keywords, &params(1, 1, 1), &WordTokenizer::new())
                .unwrap();

        // top cluster is untouched even without keyword hits
        assert_eq!(set.clusters()[&f.ids[0]].len(), 1);
        let middle = &set.clusters()[&f.ids[1]];
        assert_eq!(middle.len(), 1);
        assert_eq!(middle[0].content, "the SUMMIT opened");
        assert_eq!(summary.documents_demoted, 2);
        assert_eq!(summary.clusters_removed, 1);
    }

    #[test]
    fn middle_cluster_without_hits_is_deleted() {
        let f = fixture(&[
            (3.0, &["a"], &["a"]),
            (2.0, &["missing"], &["nothing", "matches"]),
            (1.0, &["c"], &["c"]),
        ]);

        let (set, _) =
            demote_by_rank(f.set, &f.scores, &f.keywords, &params(1, 0, 1), &WordTokenizer::new())
                .unwrap();

        assert!(!set.clusters().contains_key(&f.ids[1]));
        assert_eq!(set.other().len(), 2);
    }

    #[test]
    fn zero_last_num_demotes_nothing_by_rank() {
        let f = fixture(&[
            (3.0, &["a"], &["a"]),
            (2.0, &["b"], &["b"]),
            (1.0, &["c"], &["c c"]),
        ]);
        let before = f.set.clone();

        let (set, summary) =
            demote_by_rank(f.set, &f.scores, &f.keywords, &params(3, 0, 1), &WordTokenizer::new())
                .unwrap();

        assert_eq!(set, before);
        assert_eq!(summary, DemotionSummary::default());
    }

    #[test]
    fn ties_in_score_rank_by_cluster_id() {
        let f = fixture(&[
            (1.0, &["a"], &["a"]),
            (1.0, &["b"], &["b"]),
            (1.0, &["c"], &["c"]),
        ]);

        let (set, _) =
            demote_by_rank(f.set, &f.scores, &f.keywords, &params(2, 1, 1), &WordTokenizer::new())
                .unwrap();

        assert!(set.clusters().contains_key(&f.ids[0]));
        assert!(set.clusters().contains_key(&f.ids[1]));
        assert!(!set.clusters().contains_key(&f.ids[2]));
    }

    #[test]
    fn undersized_clusters_are_demoted() {
        let f = fixture(&[
            (1.0, &["a"], &["a", "a", "a"]),
            (1.0, &["b"], &["b", "b"]),
        ]);

        let (set, summary) = demote_by_size(f.set, 3);

        assert_eq!(set.cluster_count(), 1);
        assert!(set.clusters().contains_key(&f.ids[0]));
        assert_eq!(set.other().len(), 2);
        assert_eq!(summary.clusters_removed, 1);
    }

    #[test]
    fn label_map_always_has_other() {
        let f = fixture(&[(1.0, &["a"], &["a", "a"])]);
        let map = f.set.into_label_map();
        assert_eq!(map[&Label::Other].len(), 0);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn curate_preserves_every_document() {
        let f = fixture(&[
            (5.0, &["a"], &["a", "a", "a"]),
            (4.0, &["b"], &["b", "x", "b"]),
            (3.0, &["c"], &["c"]),
            (1.0, &["d"], &["d", "d", "d", "d"]),
        ]);
        let total = f.set.document_count();

        let outcome = curate(
            f.set,
            &f.scores,
            &f.keywords,
            &params(1, 1, 2),
            &WordTokenizer::new(),
        )
        .unwrap();

        assert_eq!(outcome.clusters.document_count(), total);
        let mut ids: Vec<String> = outcome
            .clusters
            .into_documents()
            .into_iter()
            .map(|d| d.id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    mod partition {
        use std::collections::BTreeSet;

        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn every_document_keeps_exactly_one_label(
                sizes in prop::collection::vec(1_usize..6, 1..8),
                top_num in 0_usize..4,
                last_num in 0_usize..4,
                least_size in 0_usize..5,
                words in prop::collection::vec("[abc]{1,3}", 1..30),
            ) {
                let mut documents = Vec::new();
                let mut scores = BTreeMap::new();
                let mut keywords = BTreeMap::new();
                for (cluster, size) in sizes.iter().enumerate() {
                    let id = ClusterId::new_random();
                    scores.insert(id, (cluster % 3) as f64);
                    let keyword = words[cluster % words.len()].clone();
                    keywords.insert(id, KeywordTable::from_counts([(keyword, 11)], 20));
                    for member in 0..*size {
                        let text = &words[(cluster * 7 + member) % words.len()];
                        let mut doc = Document::new(format!("{cluster}-{member}"), "", text.as_str(), Utc::now());
                        doc.label = Some(Label::Cluster(id));
                        documents.push(doc);
                    }
                }
                let input: BTreeSet<String> = documents.iter().map(|d| d.id.clone()).collect();
                let set = ClusterSet::from_labeled(documents);
                let params = CurationParams { top_num, last_num, least_size };

                match curate(set, &scores, &keywords, &params, &WordTokenizer::new()) {
                    Ok(outcome) => {
                        for members in outcome.clusters.clusters().values() {
                            prop_assert!(members.len() >= least_size);
                            prop_assert!(!members.is_empty());
                        }
                        let documents = outcome.clusters.into_documents();
                        let output: BTreeSet<String> = documents.iter().map(|d| d.id.clone()).collect();
                        prop_assert_eq!(documents.len(), input.len());
                        prop_assert_eq!(output, input);
                    }
                    Err(ClusteringError::InsufficientClusters { found, required }) => {
                        prop_assert_eq!(found, sizes.len());
                        prop_assert!(found < required);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
            }
        }
    }
}
