use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could","did","do","does","doing","down","during",
            "each","few","for","from","further","had","has","have","having",
            "he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","it's","its","itself",
            "me","more","most","my","myself","no","nor","not","of","off","on","once","only","or",
            "other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they",
            "this","those","through","to","too","under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves",
        ];
        words.iter().copied().collect()
    };
}

/// Turns text into base word forms. The same extractor must serve both the
/// index writer and the search engine so that their vocabularies agree.
pub trait LemmaExtractor: Send + Sync {
    /// Lemma -> number of occurrences in `text`.
    fn extract_lemmas(&self, text: &str) -> HashMap<String, usize>;

    /// Distinct lemmas of `text`.
    fn lemma_set(&self, text: &str) -> HashSet<String> {
        self.extract_lemmas(text).into_keys().collect()
    }
}

/// Lemma extractor using NFKC normalization, lowercasing, stop-word removal
/// and Snowball stemming.
pub struct StemmingLemmatizer {
    stemmer: Stemmer,
}

impl StemmingLemmatizer {
    pub fn new(language: Algorithm) -> Self {
        Self { stemmer: Stemmer::create(language) }
    }

    /// Builds a lemmatizer from a language name such as `"english"` or `"russian"`.
    pub fn for_language(name: &str) -> Option<Self> {
        language_from_name(name).map(Self::new)
    }

    fn tokens<'a>(&'a self, normalized: &'a str) -> impl Iterator<Item = String> + 'a {
        RE.find_iter(normalized)
            .map(|m| m.as_str())
            .filter(|token| !STOPWORDS.contains(token))
            .map(|token| self.stemmer.stem(token).into_owned())
    }
}

impl Default for StemmingLemmatizer {
    fn default() -> Self {
        Self::new(Algorithm::English)
    }
}

impl LemmaExtractor for StemmingLemmatizer {
    fn extract_lemmas(&self, text: &str) -> HashMap<String, usize> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let mut counts = HashMap::new();
        for lemma in self.tokens(&normalized) {
            *counts.entry(lemma).or_insert(0) += 1;
        }
        counts
    }

    fn lemma_set(&self, text: &str) -> HashSet<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        self.tokens(&normalized).collect()
    }
}

pub fn language_from_name(name: &str) -> Option<Algorithm> {
    let algorithm = match name.trim().to_lowercase().as_str() {
        "arabic" => Algorithm::Arabic,
        "danish" => Algorithm::Danish,
        "dutch" => Algorithm::Dutch,
        "english" => Algorithm::English,
        "french" => Algorithm::French,
        "german" => Algorithm::German,
        "greek" => Algorithm::Greek,
        "hungarian" => Algorithm::Hungarian,
        "italian" => Algorithm::Italian,
        "norwegian" => Algorithm::Norwegian,
        "portuguese" => Algorithm::Portuguese,
        "romanian" => Algorithm::Romanian,
        "russian" => Algorithm::Russian,
        "spanish" => Algorithm::Spanish,
        "swedish" => Algorithm::Swedish,
        "tamil" => Algorithm::Tamil,
        "turkish" => Algorithm::Turkish,
        _ => return None,
    };
    Some(algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_occurrences_per_lemma() {
        let lemmas = StemmingLemmatizer::default().extract_lemmas("Running, runner's run! Rust rust.");
        assert_eq!(lemmas.get("run"), Some(&2));
        assert_eq!(lemmas.get("rust"), Some(&2));
    }

    #[test]
    fn unknown_language_is_rejected() {
        assert!(StemmingLemmatizer::for_language("klingon").is_none());
        assert!(StemmingLemmatizer::for_language(" Russian ").is_some());
    }
}
