// ABOUTME: Free-text task input validation
// ABOUTME: Length ceiling is an error, near-ceiling and control characters are warnings

use crate::validation::ValidationResult;
use relay_config::MAX_TASK_INPUT_CHARS;

/// Validate free-text task input before any sandbox or tunnel work
/// begins. Empty or over-ceiling input blocks the task; everything else
/// is advisory.
pub fn validate_task_input(text: &str) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if text.trim().is_empty() {
        result.add_error("Task input cannot be empty");
        return result;
    }

    let len = text.chars().count();
    if len > MAX_TASK_INPUT_CHARS {
        result.add_error(format!(
            "Task input is {len} characters, over the {MAX_TASK_INPUT_CHARS} ceiling"
        ));
    } else if len > MAX_TASK_INPUT_CHARS * 4 / 5 {
        result.add_warning(format!(
            "Task input is {len} characters, approaching the {MAX_TASK_INPUT_CHARS} ceiling"
        ));
    }

    if text
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r')
    {
        result.add_warning("Task input contains control characters");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected() {
        assert!(!validate_task_input("").valid);
        assert!(!validate_task_input("   \n ").valid);
    }

    #[test]
    fn ordinary_input_is_clean() {
        let result = validate_task_input("analyze file: data.csv and plot a histogram");
        assert!(result.valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn over_ceiling_input_is_an_error() {
        let text = "x".repeat(MAX_TASK_INPUT_CHARS + 1);
        let result = validate_task_input(&text);
        assert!(!result.valid);
    }

    #[test]
    fn near_ceiling_input_warns_but_passes() {
        let text = "x".repeat(MAX_TASK_INPUT_CHARS * 9 / 10);
        let result = validate_task_input(&text);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn control_characters_warn_but_newline_and_tab_are_fine() {
        let result = validate_task_input("line one\nline\ttwo");
        assert!(result.valid);
        assert!(result.warnings.is_empty());

        let result = validate_task_input("sneaky\x1b[2Jtext");
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
