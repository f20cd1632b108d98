// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer generation.
//!
//! A [`Generator`] turns the assembled context and the user's query into an
//! answer. The prompt wording lives in [`PromptTemplate`] so that adapters
//! only deal with transport.

use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::config::{GenerationConfig, GeneratorType};
use crate::embedding::provider::run_json_command;

/// Prompt used when no template is configured
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Question: {query}\nReferences that may be useful: {context}\nAnswer (note that the references may contain errors):";

/// Prompt text with `{query}` and `{context}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Create a template; it must mention `{query}`.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains("{query}") {
            bail!("Prompt template must contain a {{query}} placeholder");
        }
        Ok(Self { template })
    }

    /// Substitute the context and query into the template.
    ///
    /// The context is substituted after the query so that a query containing
    /// a literal `{context}` is left alone.
    pub fn render(&self, context: &str, query: &str) -> String {
        let mut parts = self.template.split("{query}");
        let mut out = String::with_capacity(self.template.len() + context.len() + query.len());
        if let Some(first) = parts.next() {
            out.push_str(&first.replace("{context}", context));
        }
        for part in parts {
            out.push_str(query);
            out.push_str(&part.replace("{context}", context));
        }
        out
    }
}

/// Trait for answer generators.
pub trait Generator: Send {
    /// Produce an answer for `query` given the supporting `context`.
    fn generate(&mut self, context: &str, query: &str) -> Result<String>;
}

/// Builds the generator selected by the `[generation]` configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>> {
    let template = PromptTemplate::new(config.prompt_template())?;
    let generator: Box<dyn Generator> = match config.provider() {
        GeneratorType::Command => Box::new(CommandGenerator::new(
            config.command().to_string(),
            config.model().to_string(),
            config.max_length(),
            template,
        )),
        GeneratorType::Echo => Box::new(EchoGenerator::new(template)),
    };
    Ok(generator)
}

/// Generator that shells out to an external process.
///
/// The command receives `{"model", "prompt", "max_length"}` on stdin and
/// prints either plain text or a JSON object with `answer`, `text` or
/// `response`.
pub struct CommandGenerator {
    command: String,
    model: String,
    max_length: usize,
    template: PromptTemplate,
}

impl CommandGenerator {
    pub fn new(command: String, model: String, max_length: usize, template: PromptTemplate) -> Self {
        Self {
            command,
            model,
            max_length,
            template,
        }
    }
}

impl Generator for CommandGenerator {
    fn generate(&mut self, context: &str, query: &str) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": self.template.render(context, query),
            "max_length": self.max_length,
        });
        let stdout = run_json_command(&self.command, &payload)
            .with_context(|| format!("Generation command failed: {}", self.command))?;
        Ok(parse_answer(stdout.trim()))
    }
}

/// Generator that returns the rendered prompt unchanged (dry runs and tests).
pub struct EchoGenerator {
    template: PromptTemplate,
}

impl EchoGenerator {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }
}

impl Default for EchoGenerator {
    fn default() -> Self {
        Self::new(PromptTemplate::default())
    }
}

impl Generator for EchoGenerator {
    fn generate(&mut self, context: &str, query: &str) -> Result<String> {
        Ok(self.template.render(context, query))
    }
}

fn parse_answer(output: &str) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(output) {
        for key in ["answer", "text", "response"] {
            if let Some(Value::String(answer)) = obj.get(key) {
                return answer.clone();
            }
        }
    }
    output.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_renders_both_parts() {
        let prompt = PromptTemplate::default().render("Article 5 applies.", "Is this legal?");
        assert!(prompt.starts_with("Question: Is this legal?\n"));
        assert!(prompt.contains("References that may be useful: Article 5 applies."));
    }

    #[test]
    fn test_placeholder_in_query_is_not_expanded() {
        let template = PromptTemplate::new("{query} | {context}").unwrap();
        assert_eq!(template.render("ctx", "what is {context}?"), "what is {context}? | ctx");
    }

    #[test]
    fn test_template_requires_query() {
        assert!(PromptTemplate::new("only {context}").is_err());
    }

    #[test]
    fn test_echo_generator_with_empty_context() {
        let mut generator = EchoGenerator::new(PromptTemplate::new("{query}|{context}").unwrap());
        assert_eq!(generator.generate("", "q").unwrap(), "q|");
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer(r#"{"answer": "yes"}"#), "yes");
        assert_eq!(parse_answer(r#"{"response": "no"}"#), "no");
        assert_eq!(parse_answer("plain text"), "plain text");
        assert_eq!(parse_answer(r#"{"other": 1}"#), r#"{"other": 1}"#);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_generator_receives_prompt() {
        let mut generator = CommandGenerator::new(
            "cat".to_string(),
            "m".to_string(),
            64,
            PromptTemplate::new("{query}").unwrap(),
        );
        let answer = generator.generate("ignored", "hello").unwrap();
        let echoed: Value = serde_json::from_str(&answer).unwrap();
        assert_eq!(echoed["prompt"], "hello");
        assert_eq!(echoed["max_length"], 64);
    }
}
