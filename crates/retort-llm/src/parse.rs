/// Extract JSON from a response that may contain markdown code fences.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    // Try to find JSON in code fence
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    // Try to find JSON object directly. A closing brace before the first
    // opening one means there is no object to cut out.
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if start <= end {
                return &trimmed[start..=end];
            }
        }
    }
    trimmed
}
