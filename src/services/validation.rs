//! Grounds parsed model output against the catalogue it was generated from.

use std::collections::{HashMap, HashSet};

use crate::models::{
    rating_ceiling, within_ceiling, CatalogueEntry, Recommendation, RecommendationResult,
    MAX_RECOMMENDATIONS,
};

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Keeps only recommendations that exist in the catalogue and do not exceed
/// the highest rating in the recently viewed set, using the catalogue's own
/// summary and rating for each, deduplicated and capped at three.
pub fn ground(
    result: RecommendationResult,
    recently_viewed: &[CatalogueEntry],
    catalogue: &[CatalogueEntry],
) -> RecommendationResult {
    let ceiling = rating_ceiling(recently_viewed.iter().map(|e| e.content_rating.as_str()));

    let mut by_title: HashMap<String, &CatalogueEntry> = HashMap::with_capacity(catalogue.len());
    for entry in catalogue {
        by_title.entry(title_key(&entry.title)).or_insert(entry);
    }

    let mut seen = HashSet::new();
    let mut videos = Vec::new();

    for candidate in result.videos {
        let key = title_key(&candidate.title);
        let Some(entry) = by_title.get(&key) else {
            tracing::warn!(title = %candidate.title, "Dropping recommendation not in catalogue");
            continue;
        };

        let grounded = Recommendation::from(*entry);
        if !within_ceiling(&grounded.content_rating, ceiling) {
            tracing::warn!(
                title = %grounded.title,
                content_rating = %grounded.content_rating,
                "Dropping recommendation above the rating ceiling"
            );
            continue;
        }

        if seen.insert(key) {
            videos.push(grounded);
        }
        if videos.len() == MAX_RECOMMENDATIONS {
            break;
        }
    }

    RecommendationResult {
        videos,
        justification: result.justification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, rating: &str) -> CatalogueEntry {
        CatalogueEntry::new(title, format!("{} summary", title), rating, title)
    }

    fn candidate(title: &str, rating: &str) -> Recommendation {
        Recommendation {
            title: title.to_string(),
            summary: "model summary".to_string(),
            content_rating: rating.to_string(),
        }
    }

    fn result(videos: Vec<Recommendation>) -> RecommendationResult {
        RecommendationResult {
            videos,
            justification: None,
        }
    }

    #[test]
    fn test_rating_ceiling_excludes_akira() {
        let recent = vec![entry("Kiki's Delivery Service", "G")];
        let catalogue = vec![entry("Kiki's Delivery Service", "G"), entry("Akira", "R")];

        // The model claims Akira is G; the catalogue rating wins
        let grounded = ground(
            result(vec![candidate("Akira", "G"), candidate("Kiki's Delivery Service", "G")]),
            &recent,
            &catalogue,
        );

        assert_eq!(grounded.titles(), vec!["Kiki's Delivery Service"]);
    }

    #[test]
    fn test_unknown_titles_are_dropped() {
        let recent = vec![entry("Totoro", "G")];
        let catalogue = vec![entry("Totoro", "G"), entry("Ponyo", "G")];

        let grounded = ground(
            result(vec![candidate("Frozen", "G"), candidate("ponyo ", "G")]),
            &recent,
            &catalogue,
        );

        assert_eq!(grounded.titles(), vec!["Ponyo"]);
        assert_eq!(grounded.videos[0].summary, "Ponyo summary");
    }

    #[test]
    fn test_caps_and_deduplicates() {
        let recent = vec![entry("A", "R")];
        let catalogue: Vec<_> = ["A", "B", "C", "D", "E"].iter().map(|t| entry(t, "PG")).collect();

        let grounded = ground(
            result(vec![
                candidate("B", "PG"),
                candidate("B", "PG"),
                candidate("C", "PG"),
                candidate("D", "PG"),
                candidate("E", "PG"),
            ]),
            &recent,
            &catalogue,
        );

        assert_eq!(grounded.titles(), vec!["B", "C", "D"]);
    }

    #[test]
    fn test_missing_rating_becomes_nr_and_is_kept() {
        let recent = vec![entry("Totoro", "G")];
        let catalogue = vec![entry("Totoro", "G"), entry("Home Movie", "")];

        let grounded = ground(result(vec![candidate("Home Movie", "")]), &recent, &catalogue);

        assert_eq!(grounded.videos[0].content_rating, "NR");
    }

    #[test]
    fn test_no_known_ceiling_allows_everything() {
        let recent = vec![entry("Home Movie", "")];
        let catalogue = vec![entry("Akira", "R")];

        let grounded = ground(result(vec![candidate("Akira", "R")]), &recent, &catalogue);

        assert_eq!(grounded.titles(), vec!["Akira"]);
    }

    #[test]
    fn test_justification_is_kept() {
        let recent = vec![entry("Totoro", "G")];
        let catalogue = vec![entry("Ponyo", "G")];
        let input = RecommendationResult {
            videos: vec![candidate("Ponyo", "G")],
            justification: Some("More Ghibli".to_string()),
        };

        let grounded = ground(input, &recent, &catalogue);
        assert_eq!(grounded.justification.as_deref(), Some("More Ghibli"));
    }
}
