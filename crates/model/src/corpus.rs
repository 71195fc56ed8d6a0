use alloc::{string::String, vec::Vec};
use serde::{Deserialize, Serialize};

/// A reusable bank of question/answer variants.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Corpus {
    pub id: i64,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CorpusEntry {
    pub corpus_id: i64,
    pub tags: Vec<String>,
    pub question_variants: Vec<String>,
    pub answer_variants: Vec<String>,
    /// Parallel to [`CorpusEntry::hint_variants`].
    pub hint_titles: Vec<String>,
    pub hint_variants: Vec<String>,
}
