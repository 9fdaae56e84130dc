//! Content quality score attached to posts before they are saved.

use serde::Serialize;

/// Fields the scorer looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInput<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub excerpt: Option<&'a str>,
    pub meta_description: Option<&'a str>,
    pub focus_keyword: Option<&'a str>,
    pub has_image: bool,
    pub has_category: bool,
    pub tag_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContentScore {
    /// 0..=100
    pub total: u32,
    pub word_count: usize,
    /// Focus keyword occurrences per hundred words.
    pub keyword_density: f64,
    /// Share of optional metadata that is filled in, 0.0..=1.0.
    pub metadata_completeness: f64,
}

pub trait ContentScorer: Send + Sync {
    fn score(&self, input: &ScoreInput<'_>) -> ContentScore;
}

/// Length, keyword and metadata heuristic used by the blog editor.
///
/// Up to 40 points for length, 30 for a focus keyword density between 0.5%
/// and 2.5%, and 30 for metadata completeness.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl ContentScorer for HeuristicScorer {
    fn score(&self, input: &ScoreInput<'_>) -> ContentScore {
        let word_count = count_words(input.content);
        let keyword_density = input
            .focus_keyword
            .map(|keyword| keyword_density(input.content, keyword, word_count))
            .unwrap_or(0.0);
        let metadata_completeness = metadata_completeness(input);

        let length_points = match word_count {
            0 => 0,
            1..300 => 10,
            300..800 => 20,
            800..1500 => 30,
            _ => 40,
        };
        let keyword_points = if keyword_density == 0.0 {
            0
        } else if keyword_density < 0.5 {
            15
        } else if keyword_density <= 2.5 {
            30
        } else {
            10
        };
        let metadata_points = (metadata_completeness * 30.0).round() as u32;

        ContentScore {
            total: (length_points + keyword_points + metadata_points).min(100),
            word_count,
            keyword_density,
            metadata_completeness,
        }
    }
}

fn count_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|word| word.chars().any(char::is_alphanumeric))
        .count()
}

fn keyword_density(content: &str, keyword: &str, word_count: usize) -> f64 {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() || word_count == 0 {
        return 0.0;
    }
    let occurrences = content.to_lowercase().matches(keyword.as_str()).count();
    occurrences as f64 * 100.0 / word_count as f64
}

fn metadata_completeness(input: &ScoreInput<'_>) -> f64 {
    let filled = |value: Option<&str>| value.is_some_and(|v| !v.trim().is_empty());
    let checks = [
        !input.title.trim().is_empty(),
        filled(input.excerpt),
        filled(input.meta_description),
        filled(input.focus_keyword),
        input.has_image,
        input.has_category,
        input.tag_count > 0,
    ];
    let present = checks.iter().filter(|present| **present).count();
    present as f64 / checks.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(words: usize, keyword_every: usize) -> String {
        (0..words)
            .map(|i| {
                if keyword_every > 0 && i % keyword_every == 0 {
                    "outsourcing"
                } else {
                    "text"
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn empty_post_scores_only_its_title() {
        let score = HeuristicScorer.score(&ScoreInput {
            title: "Draft",
            ..Default::default()
        });
        assert_eq!(score.word_count, 0);
        assert_eq!(score.keyword_density, 0.0);
        assert_eq!(score.total, 4);
    }

    #[test]
    fn complete_post_reaches_full_score() {
        let content = body(1000, 100);
        let score = HeuristicScorer.score(&ScoreInput {
            title: "Outsourcing support",
            content: &content,
            excerpt: Some("Why it works"),
            meta_description: Some("A guide"),
            focus_keyword: Some("Outsourcing"),
            has_image: true,
            has_category: true,
            tag_count: 2,
        });

        assert_eq!(score.word_count, 1000);
        assert!((score.keyword_density - 1.0).abs() < f64::EPSILON);
        assert_eq!(score.metadata_completeness, 1.0);
        assert_eq!(score.total, 30 + 30 + 30);
    }

    #[test]
    fn keyword_stuffing_is_penalized() {
        let content = body(400, 2);
        let score = HeuristicScorer.score(&ScoreInput {
            title: "t",
            content: &content,
            focus_keyword: Some("outsourcing"),
            ..Default::default()
        });
        assert!(score.keyword_density > 2.5);
        // 20 length + 10 keyword + 2/7 metadata
        assert_eq!(score.total, 20 + 10 + 9);
    }
}
