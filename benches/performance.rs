/// ベクトル化・スコアリング・選別の性能ベンチマーク。
use std::collections::BTreeMap;

use chrono::Utc;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use subevent_worker::pipeline::curate::{ClusterSet, CurationParams, curate};
use subevent_worker::pipeline::keywords::{KeywordTable, top_keywords};
use subevent_worker::pipeline::scoring::cluster_scores;
use subevent_worker::pipeline::vectorize::vectorize;
use subevent_worker::store::models::{ClusterId, Document, Label};
use subevent_worker::tokenizer::{Tokenizer, WordTokenizer};

const VOCABULARY: &[&str] = &[
    "apec", "summit", "leaders", "beijing", "trade", "football", "match", "goal", "striker",
    "weather", "rain", "storm", "market", "stocks", "rally", "election", "vote", "poll",
];

/// `count` 件の合成ドキュメントを `clusters` 個のクラスタに均等に割り当てる。
fn synthetic_documents(count: usize, clusters: usize) -> Vec<Document> {
    let ids: Vec<ClusterId> = (0..clusters).map(|_| ClusterId::new_random()).collect();
    (0..count)
        .map(|i| {
            let cluster = i % clusters;
            let words: Vec<&str> = (0..12)
                .map(|j| VOCABULARY[(cluster * 3 + (i + j) % 5) % VOCABULARY.len()])
                .collect();
            let mut document =
                Document::new(i.to_string(), words[0], format!(" {}", words[1..].join(" ")), Utc::now());
            document.label = Some(Label::Cluster(ids[cluster]));
            document
        })
        .collect()
}

fn bench_vectorize(c: &mut Criterion) {
    let tokenizer = WordTokenizer::new();
    let documents = synthetic_documents(2000, 10);
    let tokens: Vec<Vec<String>> = documents
        .iter()
        .map(|document| tokenizer.tokenize(&document.text()))
        .collect();

    c.bench_function("vectorize_2k_docs", |b| {
        b.iter(|| {
            let matrix = vectorize(&tokens).expect("non-empty batch");
            black_box(matrix.nonzero_count());
        });
    });
}

fn bench_scoring_and_curation(c: &mut Criterion) {
    let tokenizer = WordTokenizer::new();
    let set = ClusterSet::from_labeled(synthetic_documents(2000, 10));
    let keywords: BTreeMap<ClusterId, KeywordTable> = set
        .clusters()
        .iter()
        .map(|(id, members)| (*id, top_keywords(members, &tokenizer, 20)))
        .collect();

    c.bench_function("cluster_scores_10_clusters", |b| {
        b.iter(|| black_box(cluster_scores(&keywords, 10).len()));
    });

    let scores = cluster_scores(&keywords, 10);
    let params = CurationParams::default();
    c.bench_function("curate_2k_docs", |b| {
        b.iter(|| {
            let outcome = curate(set.clone(), &scores, &keywords, &params, &tokenizer)
                .expect("enough clusters");
            black_box(outcome.clusters.cluster_count());
        });
    });
}

criterion_group!(benches, bench_vectorize, bench_scoring_and_curation);
criterion_main!(benches);
