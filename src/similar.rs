//! TF-IDF similarity between a new question and previously answered ones.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Scores at or below this are not considered similar.
pub const SIMILARITY_THRESHOLD: f64 = 0.23;
pub const MAX_SIMILAR: usize = 3;

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("static regex"))
}

/// Lowercased words of two or more characters.
fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    token_pattern()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

type Vector = HashMap<String, f64>;

/// L2-normalised TF-IDF vectors for a corpus, with smoothed idf
/// `ln((1 + n) / (1 + df)) + 1`.
fn tfidf(corpus: &[Vec<String>]) -> Vec<Vector> {
    let n = corpus.len() as f64;
    let mut df: HashMap<&str, f64> = HashMap::new();
    for doc in corpus {
        let mut seen: Vec<&str> = doc.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for term in seen {
            *df.entry(term).or_default() += 1.0;
        }
    }

    corpus
        .iter()
        .map(|doc| {
            let mut v: Vector = HashMap::new();
            for term in doc {
                *v.entry(term.clone()).or_default() += 1.0;
            }
            for (term, weight) in v.iter_mut() {
                let idf = ((1.0 + n) / (1.0 + df[term.as_str()])).ln() + 1.0;
                *weight *= idf;
            }
            let norm = v.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                v.values_mut().for_each(|w| *w /= norm);
            }
            v
        })
        .collect()
}

fn dot(a: &Vector, b: &Vector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|x| w * x))
        .sum()
}

/// Cosine similarity of `question` against every candidate, in candidate
/// order. The vocabulary is fitted on the candidates plus the question.
pub fn similarity_scores(candidates: &[String], question: &str) -> Vec<f64> {
    let mut corpus: Vec<Vec<String>> = candidates.iter().map(|c| tokenize(c)).collect();
    corpus.push(tokenize(question));
    let vectors = tfidf(&corpus);
    let Some((target, rest)) = vectors.split_last() else {
        return Vec::new();
    };
    rest.iter().map(|v| dot(target, v)).collect()
}

/// Up to [`MAX_SIMILAR`] candidates scoring above the threshold, best first.
pub fn most_similar(candidates: &[String], question: &str) -> Vec<(f64, String)> {
    let mut scored: Vec<(f64, String)> = similarity_scores(candidates, question)
        .into_iter()
        .zip(candidates.iter().cloned())
        .filter(|(score, _)| *score > SIMILARITY_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.truncate(MAX_SIMILAR);
    scored
}
