//! Text chunking for ingestion.
//!
//! `Semantic` groups sentences and cuts where the embedding distance between
//! neighbouring groups jumps above the 95th percentile. `Recursive` splits on
//! paragraph, line, word and character boundaries until pieces fit.

use buddha_store::{cosine_similarity, Embedder, StoreError};

const BREAKPOINT_PERCENTILE: f64 = 95.0;
const BUFFER_SIZE: usize = 1;

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Clone)]
pub enum Chunker {
    Semantic(Embedder),
    Recursive(RecursiveSplitter),
}

impl Chunker {
    pub fn semantic(embedder: Embedder) -> Self {
        Chunker::Semantic(embedder)
    }

    pub fn recursive() -> Self {
        Chunker::Recursive(RecursiveSplitter::default())
    }

    pub async fn split(&self, text: &str) -> Result<Vec<String>, StoreError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Chunker::Semantic(embedder) => semantic_split(embedder, text).await,
            Chunker::Recursive(splitter) => Ok(splitter.split(text)),
        }
    }
}

/// Split after `.`, `?` or `!` when followed by whitespace. The punctuation
/// stays with its sentence; the whitespace is dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '?' | '!') {
            continue;
        }
        let end = i + c.len_utf8();
        let mut resume = end;
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            resume = j + w.len_utf8();
            chars.next();
        }
        if resume > end {
            sentences.push(text[start..end].to_string());
            start = resume;
        }
    }
    if start < text.len() || sentences.is_empty() {
        sentences.push(text[start..].to_string());
    }
    sentences
}

/// Each sentence joined with its `buffer` neighbours on either side.
pub fn combine_sentences(sentences: &[String], buffer: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let lo = i.saturating_sub(buffer);
            let hi = (i + buffer + 1).min(sentences.len());
            sentences[lo..hi].join(" ")
        })
        .collect()
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Cut after every distance above the threshold and join each run of
/// sentences with a space.
pub fn group_by_breakpoints(sentences: &[String], distances: &[f64], threshold: f64) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for (i, d) in distances.iter().enumerate() {
        if *d > threshold {
            chunks.push(sentences[start..=i].join(" "));
            start = i + 1;
        }
    }
    if start < sentences.len() {
        chunks.push(sentences[start..].join(" "));
    }
    chunks
}

async fn semantic_split(embedder: &Embedder, text: &str) -> Result<Vec<String>, StoreError> {
    let sentences = split_sentences(text);
    if sentences.len() == 1 {
        return Ok(sentences);
    }
    let combined = combine_sentences(&sentences, BUFFER_SIZE);
    let vectors = embedder.embed(&combined).await?;
    let distances: Vec<f64> = vectors
        .windows(2)
        .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]) as f64)
        .collect();
    let threshold = percentile(&distances, BREAKPOINT_PERCENTILE);
    Ok(group_by_breakpoints(&sentences, &distances, threshold))
}

/// Character splitter that tries each separator in turn. Separators are
/// kept at the start of the piece that follows them.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    pub separators: Vec<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

fn len(s: &str) -> usize {
    s.chars().count()
}

fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut out: Vec<String> = parts.next().map(str::to_string).into_iter().collect();
    out.extend(parts.map(|p| format!("{separator}{p}")));
    out.retain(|s| !s.is_empty());
    out
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut rest: &[String] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() {
                separator = "";
                break;
            }
            if text.contains(s.as_str()) {
                separator = s.as_str();
                rest = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut good: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if len(&piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge(&good));
                good.clear();
            }
            if rest.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, rest));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge(&good));
        }
        chunks
    }

    /// Pack pieces into chunks of at most `chunk_size` characters, carrying
    /// up to `chunk_overlap` characters of trailing pieces into the next.
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0;
        for piece in pieces {
            let n = len(piece);
            if total + n > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current);
                while total > self.chunk_overlap || (total + n > self.chunk_size && total > 0) {
                    total -= len(current[0]);
                    current.remove(0);
                }
            }
            current.push(piece);
            total += n;
        }
        push_joined(&mut docs, &current);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, pieces: &[&str]) {
    let joined = pieces.concat();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}
