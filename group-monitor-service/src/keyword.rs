//! Keyword predicate deciding whether a group name qualifies for monitoring.

/// True iff the lower-cased name contains the lower-cased keyword.
///
/// Absent and empty names never match.
pub fn matches_keyword(name: Option<&str>, keyword: &str) -> bool {
    match name {
        Some(n) if !n.is_empty() => n.to_lowercase().contains(&keyword.to_lowercase()),
        _ => false,
    }
}
