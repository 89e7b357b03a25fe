use crate::core::VerificationResult;

pub const NO_ISSUES: &str = "Verification completed with no issues.";

/// Renders verification results for display.
///
/// Each entry becomes a numbered block; absent fields are left out.
pub fn format_results(results: &[VerificationResult]) -> String {
    if results.is_empty() {
        return NO_ISSUES.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(index, result)| format_entry(index + 1, result))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_entry(number: usize, result: &VerificationResult) -> String {
    let fields = [
        ("Outcome", &result.outcome),
        ("Explanation", &result.explanation),
        ("Step", &result.step_name),
        ("Reason", &result.reason),
    ];

    let mut lines = vec![format!("Result {number}:")];
    lines.extend(
        fields
            .into_iter()
            .filter_map(|(label, value)| value.as_ref().map(|value| format!("{label}: {value}"))),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_results_render_no_issues() {
        assert_eq!(format_results(&[]), NO_ISSUES);
    }

    #[test]
    fn entries_are_numbered_and_skip_missing_fields() {
        let results = vec![
            VerificationResult {
                outcome: Some("FAILED".to_string()),
                explanation: Some("Connection refused".to_string()),
                step_name: Some("Connect".to_string()),
                reason: Some("timeout".to_string()),
            },
            VerificationResult {
                outcome: Some("SUCCESSFUL".to_string()),
                step_name: Some("Validate".to_string()),
                ..VerificationResult::default()
            },
        ];

        assert_eq!(
            format_results(&results),
            "Result 1:\nOutcome: FAILED\nExplanation: Connection refused\nStep: Connect\nReason: timeout\n\n\
             Result 2:\nOutcome: SUCCESSFUL\nStep: Validate"
        );
    }
}
