//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use handlebars::Handlebars;
use ragloop_core::{AppError, AppResult};
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Renders the system and user templates with Handlebars (HTML escaping
/// disabled) and records the variables on the returned `BuiltPrompt`.
///
/// # Example
/// ```no_run
/// use ragloop_prompt::{build_prompt, PromptDefinition};
/// use std::collections::HashMap;
///
/// # fn example(def: PromptDefinition) -> Result<(), Box<dyn std::error::Error>> {
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "What is this report about?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::trace!("Building prompt: {}", definition.id);

    let handlebars = renderer();

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(&handlebars, template, &variables))
        .transpose()?
        .map(|rendered| rendered.trim_end().to_string());

    let user = render_template(&handlebars, &definition.template, &variables)?;

    Ok(BuiltPrompt::new(
        system,
        user.trim_end().to_string(),
        definition.output.is_json(),
        definition.id.clone(),
        variables,
    ))
}

fn renderer() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    // Prompts are plain text, never HTML
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
}

/// Render a Handlebars template with variables.
fn render_template(
    handlebars: &Handlebars<'_>,
    template: &str,
    variables: &HashMap<String, String>,
) -> AppResult<String> {
    handlebars
        .render_template(template, variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PromptOutputSpec;

    fn create_test_definition(system: Option<&str>, format: &str) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            system: system.map(str::to_string),
            template: "Question: {{question}}".to_string(),
            output: PromptOutputSpec {
                format: format.to_string(),
            },
        }
    }

    #[test]
    fn test_render_simple_template() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Hello, world!".to_string());

        let result = render_template(&renderer(), "Question: {{question}}", &vars);
        assert_eq!(result.unwrap(), "Question: Hello, world!");
    }

    #[test]
    fn test_no_html_escaping() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Is <b>x</b> & y > z?".to_string());

        let result = render_template(&renderer(), "{{question}}", &vars).unwrap();
        assert_eq!(result, "Is <b>x</b> & y > z?");
    }

    #[test]
    fn test_build_prompt_with_system() {
        let def = create_test_definition(Some("Grade {{question}}\n"), "json");
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Test question".to_string());

        let built = build_prompt(&def, vars).unwrap();
        assert_eq!(built.user, "Question: Test question");
        assert_eq!(built.system.as_deref(), Some("Grade Test question"));
        assert!(built.expects_json);
        assert_eq!(built.prompt_id(), "test.prompt");
    }

    #[test]
    fn test_build_prompt_without_system() {
        let def = create_test_definition(None, "text");
        let built = build_prompt(&def, HashMap::new()).unwrap();
        assert_eq!(built.system, None);
        assert!(!built.expects_json);
    }

    #[test]
    fn test_render_template_missing_variable() {
        let vars = HashMap::new();
        let result = render_template(&renderer(), "Question: {{missing}}", &vars);
        // Handlebars renders missing variables as empty string
        assert_eq!(result.unwrap(), "Question: ");
    }

    #[test]
    fn test_conditional_history_block() {
        let template = "{{#if history}}History:\n{{history}}\n\n{{/if}}Q: {{question}}";

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "next?".to_string());
        vars.insert("history".to_string(), String::new());
        let without = render_template(&renderer(), template, &vars).unwrap();
        assert_eq!(without, "Q: next?");

        vars.insert("history".to_string(), "user: hi".to_string());
        let with = render_template(&renderer(), template, &vars).unwrap();
        assert!(with.starts_with("History:\nuser: hi"));
    }
}
