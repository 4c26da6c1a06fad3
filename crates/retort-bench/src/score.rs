use std::sync::OnceLock;

use regex::Regex;

use crate::task::Expected;

/// Pull the answer out of a pipeline's final message.
///
/// Pipelines are prompted to wrap their answer in `[ANSWER]...[/ANSWER]`; when
/// the tags are missing, the last non-empty line stands in.
pub fn extract_answer(text: &str) -> &str {
    if let Some(start) = text.find("[ANSWER]") {
        let rest = &text[start + "[ANSWER]".len()..];
        if let Some(end) = rest.find("[/ANSWER]") {
            return rest[..end].trim();
        }
    }
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?").expect("valid regex"))
}

/// First numeric literal in the answer, if any.
fn extract_number(answer: &str) -> Option<f64> {
    number_re()
        .find(answer)
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether `answer` satisfies the task's expectation.
pub fn is_correct(expected: &Expected, answer: &str) -> bool {
    match expected {
        Expected::Mcq { correct } => {
            let letter = answer.trim().trim_end_matches(['.', ')', ':']);
            letter.eq_ignore_ascii_case(correct.trim())
        }
        Expected::Numeric { value, tolerance } => extract_number(answer)
            .is_some_and(|found| (found - value).abs() <= *tolerance),
        Expected::Text { contains } => answer
            .to_lowercase()
            .contains(&contains.to_lowercase()),
    }
}
