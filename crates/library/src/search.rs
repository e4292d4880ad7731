//! Ranked title search over already indexed videos.
//!
//! Query syntax: `word`, `+word` (mandatory), `"exact phrase"` and
//! `+"exact phrase"`, space separated, case and accent insensitive.

use std::cmp::Ordering;
use std::sync::LazyLock;

use common::VideoItem;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const PHRASE_SCORE: u32 = 100;
const EXACT_WORD_SCORE: u32 = 50;
const STEM_SCORE: u32 = 30;
const SUBSTRING_SCORE: u32 = 10;

static QUERY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\+)?"([^"]+)"|(\+)?([^\s"]+)"#).expect("query token pattern")
});
static TITLE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[^a-zа-яё0-9]+").expect("title split pattern"));
static ENGLISH: LazyLock<Stemmer> = LazyLock::new(|| Stemmer::create(Algorithm::English));
static RUSSIAN: LazyLock<Stemmer> = LazyLock::new(|| Stemmer::create(Algorithm::Russian));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Phrase,
    Word,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryToken {
    pub value: String,
    pub stem: Option<String>,
    pub kind: TokenKind,
    pub required: bool,
}

/// Lowercases and strips diacritics (NFD, combining marks removed).
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Snowball stem; Cyrillic words go through the Russian stemmer.
pub fn stem(word: &str) -> String {
    let stemmer: &Stemmer = if word.chars().any(is_cyrillic) {
        &RUSSIAN
    } else {
        &ENGLISH
    };
    stemmer.stem(word).into_owned()
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}

pub fn parse_query(raw: &str) -> Vec<QueryToken> {
    let normalized = normalize(raw);
    let mut tokens = Vec::new();

    for caps in QUERY_TOKEN.captures_iter(&normalized) {
        if let Some(phrase) = caps.get(2) {
            tokens.push(QueryToken {
                value: phrase.as_str().to_string(),
                stem: None,
                kind: TokenKind::Phrase,
                required: caps.get(1).is_some(),
            });
        } else if let Some(word) = caps.get(4) {
            let value = word.as_str().to_string();
            tokens.push(QueryToken {
                stem: Some(stem(&value)),
                value,
                kind: TokenKind::Word,
                required: caps.get(3).is_some(),
            });
        }
    }

    tokens
}

/// Scores and ranks `videos` against `raw_query`; non-matching videos are dropped.
pub fn search(videos: &[VideoItem], raw_query: &str) -> Vec<VideoItem> {
    let tokens = parse_query(raw_query);
    if tokens.is_empty() {
        return Vec::new();
    }
    debug!("Parsed query tokens: {:?}", tokens);

    let mut scored: Vec<(u32, &VideoItem)> = videos
        .iter()
        .map(|video| (score_video(&tokens, video), video))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| compare_dates_desc(a.1, b.1))
            .then_with(|| compare_titles(a.1, b.1))
    });

    scored.into_iter().map(|(_, video)| video.clone()).collect()
}

pub fn score_video(tokens: &[QueryToken], video: &VideoItem) -> u32 {
    let title = normalize(display_title(video));
    let words: Vec<&str> = TITLE_SPLIT
        .split(&title)
        .filter(|word| !word.is_empty())
        .collect();
    let stems: Vec<String> = words.iter().map(|word| stem(word)).collect();

    let mut score = 0;
    for token in tokens {
        let token_score = match token.kind {
            TokenKind::Phrase => {
                if title.contains(&token.value) {
                    PHRASE_SCORE
                } else {
                    0
                }
            }
            TokenKind::Word => score_word(token, &words, &stems),
        };
        if token.required && token_score == 0 {
            return 0;
        }
        score += token_score;
    }
    score
}

fn score_word(token: &QueryToken, words: &[&str], stems: &[String]) -> u32 {
    let value = token.value.as_str();
    if words.iter().any(|word| *word == value) {
        EXACT_WORD_SCORE
    } else if token
        .stem
        .as_deref()
        .map(|stem| stems.iter().any(|candidate| candidate == stem))
        .unwrap_or(false)
    {
        STEM_SCORE
    } else if words.iter().any(|word| word.contains(value)) {
        SUBSTRING_SCORE
    } else {
        0
    }
}

fn display_title(video: &VideoItem) -> &str {
    if video.title.is_empty() {
        &video.filename
    } else {
        &video.title
    }
}

fn compare_dates_desc(a: &VideoItem, b: &VideoItem) -> Ordering {
    let a = a.upload_date.as_deref().filter(|d| !d.is_empty());
    let b = b.upload_date.as_deref().filter(|d| !d.is_empty());
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Accent and case insensitive first, raw text as the final tiebreak.
fn compare_titles(a: &VideoItem, b: &VideoItem) -> Ordering {
    let a = display_title(a);
    let b = display_title(b);
    normalize(a).cmp(&normalize(b)).then_with(|| a.cmp(b))
}
