//! Import of pre-partitioned document elements.
//!
//! Each line of an import file is one JSON element `{text, page?, kind?}`.
//! All elements of a file share one freshly generated parent identity, and
//! their line order becomes their element position.

use crate::store::SqliteFragmentStore;
use crate::types::{FragmentKind, ImportElement, ImportStats, RawFragment};
use ragloop_core::{AppError, AppResult};
use std::path::Path;
use std::time::Instant;

/// Import a JSONL file as one parent document.
///
/// `source` defaults to the file name.
pub async fn import_file(
    store: &SqliteFragmentStore,
    path: &Path,
    source: Option<&str>,
) -> AppResult<ImportStats> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        AppError::Knowledge(format!("Failed to read import file {:?}: {}", path, e))
    })?;

    let source = source
        .map(str::to_string)
        .or_else(|| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown".to_string());

    import_jsonl(store, &source, &contents).await
}

/// Import JSONL contents as one parent document named `source`.
pub async fn import_jsonl(
    store: &SqliteFragmentStore,
    source: &str,
    contents: &str,
) -> AppResult<ImportStats> {
    let start = Instant::now();
    let (elements, skipped_lines) = parse_elements(contents)?;

    if elements.is_empty() {
        return Err(AppError::Knowledge(format!(
            "No elements to import from '{}'",
            source
        )));
    }

    let parent_id = uuid::Uuid::new_v4().to_string();
    let fragments = to_fragments(&parent_id, source, elements);

    let texts: Vec<String> = fragments.iter().map(|f| f.text.clone()).collect();
    let embeddings = store.embedder().embed_batch(&texts).await?;
    store.insert_document(&parent_id, source, &fragments, &embeddings)?;

    let duration = start.elapsed();
    tracing::info!(
        "Imported '{}' as {}: {} fragments in {:.2}s",
        source,
        parent_id,
        fragments.len(),
        duration.as_secs_f64()
    );

    Ok(ImportStats {
        parent_id,
        source: source.to_string(),
        fragments_count: fragments.len() as u32,
        skipped_lines,
        duration_secs: duration.as_secs_f64(),
    })
}

/// Parse non-blank lines; a malformed line fails the whole import.
fn parse_elements(contents: &str) -> AppResult<(Vec<ImportElement>, u32)> {
    let mut elements = Vec::new();
    let mut skipped = 0u32;

    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            skipped += 1;
            continue;
        }

        let element: ImportElement = serde_json::from_str(line).map_err(|e| {
            AppError::Knowledge(format!("Invalid element on line {}: {}", line_no + 1, e))
        })?;
        elements.push(element);
    }

    Ok((elements, skipped))
}

fn to_fragments(parent_id: &str, source: &str, elements: Vec<ImportElement>) -> Vec<RawFragment> {
    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| {
            let kind = element.kind.unwrap_or_default();
            RawFragment {
                id: uuid::Uuid::new_v4().to_string(),
                parent_id: parent_id.to_string(),
                source: source.to_string(),
                page: element.page.filter(|p| *p > 0).unwrap_or(1),
                element_index: index as u32,
                kind,
                text: format!("{}{}", kind.text_prefix(), element.text),
            }
        })
        .collect()
}
