use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 1回の実行でのみ意味を持つクラスタ識別子。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(Uuid);

impl ClusterId {
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for ClusterId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// ドキュメントに付与される最終ラベル。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Cluster(ClusterId),
    Other,
}

impl Label {
    pub const OTHER: &'static str = "other";

    #[must_use]
    pub fn cluster_id(&self) -> Option<ClusterId> {
        match self {
            Self::Cluster(id) => Some(*id),
            Self::Other => None,
        }
    }

    #[must_use]
    pub fn is_other(&self) -> bool {
        matches!(self, Self::Other)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster(id) => id.fmt(f),
            Self::Other => f.write_str(Self::OTHER),
        }
    }
}

/// クラスタリング対象の記事またはコメント。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub label: Option<Label>,
}

impl Document {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            timestamp,
            label: None,
        }
    }

    /// タイトルと本文を連結したテキスト。トークナイズとキーワード照合の対象。
    #[must_use]
    pub fn text(&self) -> String {
        format!("{}{}", self.title, self.content)
    }
}

/// ドキュメントの種類。グループキーとラベル列の対応を決める。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// トピック単位でまとめられたニュース記事。
    News,
    /// ニュース記事単位でまとめられたコメント。
    Comment,
}

impl DocumentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Comment => "comment",
        }
    }

    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            Self::News => "news_documents",
            Self::Comment => "comment_documents",
        }
    }

    #[must_use]
    pub fn group_column(self) -> &'static str {
        match self {
            Self::News => "topic_id",
            Self::Comment => "news_id",
        }
    }

    #[must_use]
    pub fn label_column(self) -> &'static str {
        match self {
            Self::News => "subevent_id",
            Self::Comment => "cluster_id",
        }
    }

    /// ラベル列に書き込む値。コメントの other はニュース記事ごとに `{news_id}_other` とする。
    #[must_use]
    pub fn label_value(self, group_key: &str, label: &Label) -> String {
        match (self, label) {
            (Self::Comment, Label::Other) => format!("{group_key}_{}", Label::OTHER),
            _ => label.to_string(),
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "news" => Ok(Self::News),
            "comment" | "comments" => Ok(Self::Comment),
            other => Err(anyhow::anyhow!("unknown document kind: {other}")),
        }
    }
}

/// 選別後に残ったクラスタの永続化レコード。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub cluster_id: ClusterId,
    pub group_key: String,
    pub created_at: DateTime<Utc>,
    pub size: usize,
    pub score: f64,
    /// 特徴語とその出現回数（頻度降順）。
    pub keywords: Vec<(String, u32)>,
}
