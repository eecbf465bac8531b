/// Normalize a header cell: control characters become spaces, whitespace runs collapse
/// to a single space and the ends are trimmed
pub fn normalize_header(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Name given to a column whose header cell is blank (0-based position)
pub fn unnamed_header(index: usize) -> String {
    return format!("Unnamed: {index}");
}

pub fn is_blank(value: &str) -> bool {
    return value.trim().is_empty();
}
