//! Document-term matrix construction and the solver's sparse file layout.
//!
//! The layout is a header `<rows> <cols> <nonzero>` followed by one line per
//! document with space separated `<1-based term index> <count>` pairs.

use std::collections::BTreeSet;
use std::io::{BufRead, Write};

use rustc_hash::FxHashMap;

use crate::error::ClusteringError;

/// Term ↔ dense index mapping, valid for one run only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermDictionary {
    terms: Vec<String>,
    index: FxHashMap<String, usize>,
}

impl TermDictionary {
    /// Indices follow lexicographic term order so that the same vocabulary
    /// always yields the same dictionary.
    fn from_vocabulary<'a>(vocabulary: impl IntoIterator<Item = &'a str>) -> Self {
        let sorted: BTreeSet<&str> = vocabulary.into_iter().collect();
        let terms: Vec<String> = sorted.into_iter().map(ToString::to_string).collect();
        let index = terms
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();
        Self { terms, index }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    #[must_use]
    pub fn term(&self, index: usize) -> Option<&str> {
        self.terms.get(index).map(String::as_str)
    }
}

/// Bag-of-words row: `(term index, count)` sorted by index, never holding a zero count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagOfWords(Vec<(usize, u32)>);

impl BagOfWords {
    #[must_use]
    pub fn entries(&self) -> &[(usize, u32)] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTermMatrix {
    dictionary: TermDictionary,
    rows: Vec<BagOfWords>,
    nonzero_count: usize,
}

impl DocumentTermMatrix {
    #[must_use]
    pub fn dictionary(&self) -> &TermDictionary {
        &self.dictionary
    }

    #[must_use]
    pub fn rows(&self) -> &[BagOfWords] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.dictionary.len()
    }

    #[must_use]
    pub fn nonzero_count(&self) -> usize {
        self.nonzero_count
    }

    /// Writes the matrix in the solver's sparse text layout.
    ///
    /// # Errors
    /// Propagates write failures from `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(
            writer,
            "{} {} {}",
            self.row_count(),
            self.column_count(),
            self.nonzero_count
        )?;
        for row in &self.rows {
            let line = row
                .entries()
                .iter()
                .map(|(index, count)| format!("{} {count}", index + 1))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(writer, "{line}")?;
        }
        writer.flush()
    }
}

/// Builds the dictionary and one bag-of-words row per tokenized document.
///
/// # Errors
/// Returns [`ClusteringError::EmptyInput`] when `documents` is empty.
pub fn vectorize<S: AsRef<str>>(
    documents: &[Vec<S>],
) -> Result<DocumentTermMatrix, ClusteringError> {
    if documents.is_empty() {
        return Err(ClusteringError::EmptyInput);
    }

    let dictionary = TermDictionary::from_vocabulary(
        documents
            .iter()
            .flat_map(|tokens| tokens.iter().map(AsRef::as_ref)),
    );

    let mut nonzero_count = 0;
    let rows = documents
        .iter()
        .map(|tokens| {
            let mut counts: FxHashMap<usize, u32> = FxHashMap::default();
            for token in tokens {
                if let Some(index) = dictionary.index_of(token.as_ref()) {
                    *counts.entry(index).or_insert(0) += 1;
                }
            }
            let mut entries: Vec<(usize, u32)> = counts.into_iter().collect();
            entries.sort_unstable_by_key(|(index, _)| *index);
            nonzero_count += entries.len();
            BagOfWords(entries)
        })
        .collect();

    Ok(DocumentTermMatrix {
        dictionary,
        rows,
        nonzero_count,
    })
}

/// Header and rows recovered from a sparse matrix file. Indices are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMatrix {
    pub row_count: usize,
    pub column_count: usize,
    pub nonzero_count: usize,
    pub rows: Vec<Vec<(usize, u32)>>,
}

/// Parses a file in the layout produced by [`DocumentTermMatrix::write_to`].
///
/// # Errors
/// Returns [`ClusteringError::ResultParse`] on a malformed header or row, an index
/// outside the declared columns, a zero count, or a row/nonzero count mismatch.
pub fn parse_matrix<R: BufRead>(reader: R) -> Result<ParsedMatrix, ClusteringError> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .ok_or_else(|| ClusteringError::result_parse("matrix file is empty"))??;
    let header_fields = parse_numbers(&header, "header")?;
    let [row_count, column_count, nonzero_count] = header_fields[..] else {
        return Err(ClusteringError::result_parse(format!(
            "header must hold three counts, found {}",
            header_fields.len()
        )));
    };

    let mut rows = Vec::with_capacity(row_count);
    let mut seen_nonzero = 0;
    for (line_no, line) in lines.enumerate() {
        let line = line?;
        if rows.len() == row_count {
            if line.trim().is_empty() {
                continue;
            }
            return Err(ClusteringError::result_parse(format!(
                "more rows than the declared {row_count}"
            )));
        }
        let fields = parse_numbers(&line, "row")?;
        if fields.len() % 2 != 0 {
            return Err(ClusteringError::result_parse(format!(
                "row {} has an odd number of fields",
                line_no + 1
            )));
        }
        let mut row = Vec::with_capacity(fields.len() / 2);
        for pair in fields.chunks_exact(2) {
            let (index, count) = (pair[0], pair[1]);
            if index == 0 || index > column_count {
                return Err(ClusteringError::result_parse(format!(
                    "row {} references column {index} outside 1..={column_count}",
                    line_no + 1
                )));
            }
            let count = u32::try_from(count)
                .ok()
                .filter(|count| *count > 0)
                .ok_or_else(|| {
                    ClusteringError::result_parse(format!(
                        "row {} has invalid count {count}",
                        line_no + 1
                    ))
                })?;
            row.push((index - 1, count));
        }
        seen_nonzero += row.len();
        rows.push(row);
    }

    if rows.len() != row_count {
        return Err(ClusteringError::result_parse(format!(
            "declared {row_count} rows, found {}",
            rows.len()
        )));
    }
    if seen_nonzero != nonzero_count {
        return Err(ClusteringError::result_parse(format!(
            "declared {nonzero_count} nonzero entries, found {seen_nonzero}"
        )));
    }

    Ok(ParsedMatrix {
        row_count,
        column_count,
        nonzero_count,
        rows,
    })
}

fn parse_numbers(line: &str, what: &str) -> Result<Vec<usize>, ClusteringError> {
    line.split_whitespace()
        .map(|field| {
            field.parse::<usize>().map_err(|error| {
                ClusteringError::result_parse(format!("invalid {what} field {field:?}: {error}"))
            })
        })
        .collect()
}
