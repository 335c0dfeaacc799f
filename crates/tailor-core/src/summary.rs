//! Extractive summaries of job descriptions.
//!
//! Postings are long and repetitive; the fit prompt carries a few of the
//! most content-heavy sentences of each instead of the full text.

use std::collections::HashMap;

const STOPWORDS: &[&str] = &[
    "a", "about", "across", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "do", "for", "from", "has", "have", "if", "in", "into", "is", "it", "its",
    "more", "most", "must", "not", "of", "on", "or", "our", "other", "so", "such", "than", "that",
    "the", "their", "them", "there", "these", "they", "this", "to", "us", "we", "well", "were",
    "what", "when", "which", "who", "will", "with", "within", "you", "your",
];

/// Default number of sentences kept per description.
pub const DEFAULT_SENTENCES: usize = 10;

/// Keep the `max_sentences` sentences with the highest mean word frequency,
/// in their original order. Text with no more sentences than that is
/// returned whitespace-normalized.
pub fn summarize(text: &str, max_sentences: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.len() <= max_sentences {
        return sentences.join(" ");
    }
    if max_sentences == 0 {
        return String::new();
    }

    let mut frequency: HashMap<String, usize> = HashMap::new();
    for sentence in &sentences {
        for word in content_words(sentence) {
            *frequency.entry(word).or_default() += 1;
        }
    }

    let mut scored: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(i, sentence)| {
            let words = content_words(sentence);
            let score = if words.is_empty() {
                0.0
            } else {
                let total: usize = words.iter().map(|w| frequency[w]).sum();
                total as f64 / words.len() as f64
            };
            (i, score)
        })
        .collect();

    // Highest score first; earlier sentence wins a tie.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut keep: Vec<usize> = scored.into_iter().take(max_sentences).map(|(i, _)| i).collect();
    keep.sort_unstable();

    keep.into_iter()
        .map(|i| sentences[i].as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sentences end at `.`, `!`, `?` followed by whitespace, or at a line break.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        let mut current = String::new();
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            current.push(c);
            let at_boundary = matches!(c, '.' | '!' | '?')
                && chars.peek().is_none_or(|next| next.is_whitespace());
            if at_boundary {
                push_sentence(&mut sentences, &current);
                current.clear();
            }
        }
        push_sentence(&mut sentences, &current);
    }
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    // Bullets and separators with no letters are not sentences.
    if normalized.chars().any(char::is_alphanumeric) {
        sentences.push(normalized);
    }
}

fn content_words(sentence: &str) -> Vec<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_returned_whole() {
        let text = "We build payments.\n\n  You write Rust.  ";
        assert_eq!(summarize(text, 10), "We build payments. You write Rust.");
    }

    #[test]
    fn keeps_requested_count_in_original_order() {
        let text = "Acme is a company. We value Go and distributed systems. \
                    Lunch is catered on Fridays. Go services run distributed systems at scale. \
                    The office has plants.";
        let summary = summarize(text, 2);
        assert_eq!(
            summary,
            "We value Go and distributed systems. Go services run distributed systems at scale."
        );
    }

    #[test]
    fn splits_on_line_breaks_and_skips_bullet_markers() {
        let sentences = split_sentences("Requirements\n- Rust\n•\nKafka experience");
        assert_eq!(sentences, vec!["Requirements", "- Rust", "Kafka experience"]);
    }

    #[test]
    fn decimal_points_do_not_split() {
        let sentences = split_sentences("Python 3.12 required. Nice.");
        assert_eq!(sentences, vec!["Python 3.12 required.", "Nice."]);
    }

    #[test]
    fn zero_sentences_yields_empty() {
        assert_eq!(summarize("One. Two.", 0), "");
        assert_eq!(summarize("", 3), "");
    }
}
