//! Prompt loader for built-in and workspace YAML prompt definitions.

use crate::types::PromptDefinition;
use ragloop_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

/// Well-known prompt identifiers used by the control loop.
pub mod ids {
    pub const ROUTE_INTENT: &str = "route.intent";
    pub const GRADE_RELEVANCE: &str = "grade.relevance";
    pub const GRADE_GROUNDING: &str = "grade.grounding";
    pub const GRADE_USEFULNESS: &str = "grade.usefulness";
    pub const REWRITE_QUERY: &str = "rewrite.query";
    pub const ANSWER_GENERATE: &str = "answer.generate";
}

/// Built-in definitions shipped with the crate, keyed by prompt ID.
const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    (ids::ROUTE_INTENT, include_str!("../defaults/route.intent.yml")),
    (ids::GRADE_RELEVANCE, include_str!("../defaults/grade.relevance.yml")),
    (ids::GRADE_GROUNDING, include_str!("../defaults/grade.grounding.yml")),
    (ids::GRADE_USEFULNESS, include_str!("../defaults/grade.usefulness.yml")),
    (ids::REWRITE_QUERY, include_str!("../defaults/rewrite.query.yml")),
    (ids::ANSWER_GENERATE, include_str!("../defaults/answer.generate.yml")),
];

/// Load a prompt definition by ID.
///
/// A workspace file `.ragloop/prompts/<id>.yml` takes precedence over the
/// built-in definition of the same ID.
///
/// # Example
/// ```no_run
/// use ragloop_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "grade.relevance")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = workspace_path
        .join(".ragloop/prompts")
        .join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let definition = parse_prompt(&contents, &prompt_file.display().to_string())?;
        if definition.id != prompt_id {
            return Err(AppError::Prompt(format!(
                "Prompt file {:?} declares id '{}', expected '{}'",
                prompt_file, definition.id, prompt_id
            )));
        }
        return Ok(definition);
    }

    load_builtin(prompt_id)
}

/// Load a built-in prompt definition by ID.
pub fn load_builtin(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (_, contents) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;

    parse_prompt(contents, prompt_id)
}

/// List every prompt ID available in the workspace (built-ins plus overrides).
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = BUILTIN_PROMPTS
        .iter()
        .map(|(id, _)| id.to_string())
        .collect();

    let prompts_dir = workspace_path.join(".ragloop/prompts");
    if prompts_dir.exists() {
        for entry in walkdir::WalkDir::new(&prompts_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !prompt_ids.iter().any(|id| id == stem) {
                        prompt_ids.push(stem.to_string());
                    }
                }
            }
        }
    }

    Ok(prompt_ids)
}

/// The set of prompts the control loop needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    prompts: HashMap<String, PromptDefinition>,
}

impl PromptLibrary {
    /// Resolve every control-loop prompt for a workspace.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        let prompts = BUILTIN_PROMPTS
            .iter()
            .map(|(id, _)| Ok((id.to_string(), load_prompt(workspace_path, id)?)))
            .collect::<AppResult<HashMap<_, _>>>()?;

        tracing::debug!("Loaded {} prompt definitions", prompts.len());
        Ok(Self { prompts })
    }

    /// Built-in prompts only.
    pub fn builtin() -> AppResult<Self> {
        let prompts = BUILTIN_PROMPTS
            .iter()
            .map(|(id, _)| Ok((id.to_string(), load_builtin(id)?)))
            .collect::<AppResult<HashMap<_, _>>>()?;
        Ok(Self { prompts })
    }

    /// Get a definition by ID.
    pub fn get(&self, prompt_id: &str) -> AppResult<&PromptDefinition> {
        self.prompts
            .get(prompt_id)
            .ok_or_else(|| AppError::Prompt(format!("Prompt not loaded: {}", prompt_id)))
    }
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e)))?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if !matches!(def.output.format.to_lowercase().as_str(), "text" | "json") {
        return Err(AppError::Prompt(format!(
            "Invalid output format '{}' for prompt {}. Expected 'text' or 'json'",
            def.output.format, def.id
        )));
    }

    Ok(())
}
