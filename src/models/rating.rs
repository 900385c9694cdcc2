/// Rating used when the catalogue or the model gives none
pub const NOT_RATED: &str = "NR";

/// Position of a content rating on a single audience ladder, shared by film and TV ratings.
///
/// Returns `None` for unrated or unrecognised ratings. Regional prefixes such as
/// `gb/` are ignored.
pub fn rating_level(rating: &str) -> Option<u8> {
    let rating = rating.trim();
    let rating = rating.rsplit('/').next().unwrap_or(rating);
    let normalized = rating.trim().to_ascii_uppercase().replace(['_', ' '], "-");

    match normalized.as_str() {
        "G" | "TV-Y" | "TV-G" | "U" => Some(0),
        "PG" | "TV-Y7" | "TV-Y7-FV" | "TV-PG" => Some(1),
        "PG-13" | "TV-14" | "12" | "12A" => Some(2),
        "R" | "TV-MA" | "15" | "18" => Some(3),
        "NC-17" | "X" | "R18" => Some(4),
        _ => None,
    }
}

/// Highest known rating level among the given ratings
pub fn rating_ceiling<'a, I>(ratings: I) -> Option<u8>
where
    I: IntoIterator<Item = &'a str>,
{
    ratings.into_iter().filter_map(rating_level).max()
}

/// Whether a rating is allowed under a ceiling. Unrated content is never excluded.
pub fn within_ceiling(rating: &str, ceiling: Option<u8>) -> bool {
    match (rating_level(rating), ceiling) {
        (Some(level), Some(ceiling)) => level <= ceiling,
        _ => true,
    }
}
