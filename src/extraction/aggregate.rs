use super::schema::ClassificationResult;

/// Composite CAD-RADS label, e.g. `3/P2/HRP`.
///
/// Values equal to the field's absent token, or empty, are dropped; the rest
/// are joined with `/` in canonical field order.
pub fn combine(result: &ClassificationResult) -> String {
    result
        .iter()
        .filter(|(field, value)| !value.is_empty() && *value != field.absent_token())
        .map(|(_, value)| value)
        .collect::<Vec<_>>()
        .join("/")
}
