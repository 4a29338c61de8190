//! Prompt Builder System
//!
//! Standardized prompt construction for the two model calls the pipeline
//! makes: the code explanation and the pre-flight code validation.

/// Builds a prompt out of blank-line separated blocks.
///
/// Each call renders its block immediately; `build` only joins them.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    blocks: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening persona line
    pub fn role(self, expertise: &str, task: &str) -> Self {
        self.push(format!("You are an expert {expertise} specializing in {task}."))
    }

    /// Numbered list, one item per line
    pub fn objectives(self, items: Vec<&str>) -> Self {
        let list = items
            .iter()
            .enumerate()
            .map(|(n, item)| format!("{}. {}", n + 1, item))
            .collect::<Vec<_>>()
            .join("\n");
        self.push(list)
    }

    pub fn text(self, content: &str) -> Self {
        self.push(content.to_string())
    }

    /// Heading line, followed by `body` unless it is empty
    pub fn section(self, heading: &str, body: &str) -> Self {
        self.push(heading.to_string()).text(body)
    }

    /// Fenced block; an empty language gives a bare fence
    pub fn code(self, language: &str, source: &str) -> Self {
        let newline = if source.ends_with('\n') { "" } else { "\n" };
        self.push(format!("```{language}\n{source}{newline}```"))
    }

    pub fn build(self) -> String {
        self.blocks.join("\n\n")
    }

    fn push(mut self, block: String) -> Self {
        if !block.trim().is_empty() {
            self.blocks.push(block);
        }
        self
    }
}

/// Preset prompt templates
pub struct PromptTemplates;

impl PromptTemplates {
    /// Prompt asking for a markdown explanation of `source`
    pub fn code_explanation(language: &str, source: &str) -> String {
        let fence_language = language.trim().to_lowercase();
        PromptBuilder::new()
            .role("programmer and technical educator", "explaining source code")
            .text(
                "Analyze the following piece of code and provide a clear, comprehensive \
                 explanation. Focus on:",
            )
            .objectives(vec![
                "Overall purpose and functionality",
                "Complex sections, algorithms, or patterns used",
                "Key logic flow and important details",
                "Potential edge cases or gotchas",
                "Performance considerations if relevant",
            ])
            .text(
                "Structure your explanation to be clear and easy to understand. \
                 Use markdown formatting for readability.",
            )
            .section(&format!("Code to explain ({}):", language.trim()), "")
            .code(&fence_language, source)
            .build()
    }

    /// Prompt asking whether `sample` is programming code, answered as JSON
    pub fn code_validation(sample: &str) -> String {
        PromptBuilder::new()
            .text("Validate if this is actual programming code.")
            .section("Code to validate:", "")
            .code("", sample)
            .text("Be lenient. Provide your assessment with a confidence score.")
            .text(
                "Respond ONLY with a JSON object of the form \
                 {\"is_valid\": true or false, \"reason\": \"short explanation\", \
                 \"confidence\": number between 0 and 1}.",
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_prompt() {
        let prompt = PromptBuilder::new()
            .role("code analyst", "Rust")
            .objectives(vec!["Analyze code", "Explain it"])
            .build();

        assert!(prompt.starts_with("You are an expert code analyst specializing in Rust."));
        assert!(prompt.contains("1. Analyze code"));
        assert!(prompt.contains("2. Explain it"));
    }

    #[test]
    fn test_code_block_closed_once() {
        let prompt = PromptBuilder::new().code("python", "print(1)\n").build();
        assert_eq!(prompt, "```python\nprint(1)\n```");
    }

    #[test]
    fn test_explanation_template() {
        let prompt = PromptTemplates::code_explanation("Python", "def f(n):\n    return n * 2");
        assert!(prompt.contains("Overall purpose and functionality"));
        assert!(prompt.contains("5. Performance considerations if relevant"));
        assert!(prompt.contains("Code to explain (Python):"));
        assert!(prompt.contains("```python\ndef f(n):\n    return n * 2\n```"));
    }

    #[test]
    fn test_validation_template() {
        let prompt = PromptTemplates::code_validation("SELECT * FROM users;");
        assert!(prompt.starts_with("Validate if this is actual programming code."));
        assert!(prompt.contains("```\nSELECT * FROM users;\n```"));
        assert!(prompt.contains("Be lenient."));
        assert!(prompt.contains("\"is_valid\""));
    }
}
