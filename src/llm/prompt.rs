//! Prompt template for code generation.

/// Build the generation prompt for `description` in `target_language`.
///
/// The prompt ends with a `Code:` marker so that a model which answers
/// without a fence still gives the extractor something to anchor on.
pub fn build_prompt(target_language: &str, description: &str) -> String {
    format!(
        r#"You are a compiler that translates English to {lang} code. IMPORTANT: Generate ONLY code with NO explanations, comments, or any other text.

Your response must ONLY contain valid {lang} code and nothing else. Do not include any explanations before or after the code.

Translate the following English description into {lang} code:

{description}

Code:"#,
        lang = target_language,
        description = description,
    )
}
