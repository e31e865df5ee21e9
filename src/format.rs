//! Markdown renderings for CLI output and tool responses.

use crate::lineage::GraphRow;
use crate::merge::{ChangeKind, MergePreview};
use crate::resolve::{ResolvedSnapshot, ValueSource};
use crate::types::{ProjectTemplate, TemplateSummary, VersionStatus};
use serde_json::Value;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

const MASK: &str = "******";

fn source_label(source: ValueSource) -> &'static str {
    match source {
        ValueSource::Override => "override",
        ValueSource::Default => "default",
        ValueSource::Fixed => "fixed",
        ValueSource::Manual => "manual",
        ValueSource::Global => "global",
        ValueSource::Dangling => "dangling",
    }
}

/// Resolved snapshot as markdown tables. Hidden values are masked unless
/// `reveal_hidden` is set.
pub fn format_snapshot_markdown(snapshot: &ResolvedSnapshot, reveal_hidden: bool) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Resolved configuration {}\n\n", snapshot.version));

    if !snapshot.warnings.is_empty() {
        md.push_str("## Warnings\n\n");
        for warning in &snapshot.warnings {
            md.push_str(&format!("- {}\n", warning));
        }
        md.push('\n');
    }

    md.push_str(&format!("## Globals ({})\n\n", snapshot.globals.len()));
    if !snapshot.globals.is_empty() {
        md.push_str("| name | value | source |\n|---|---|---|\n");
        for g in &snapshot.globals {
            let value = if g.is_hidden && !reveal_hidden {
                MASK
            } else {
                g.value.as_str()
            };
            md.push_str(&format!(
                "| {} | `{}` | {} |\n",
                g.name,
                value,
                source_label(g.source)
            ));
        }
        md.push('\n');
    }

    for module in &snapshot.modules {
        md.push_str(&format!(
            "## {} {} (`{}`)\n\n",
            module.project_name, module.project_version, module.project_id
        ));
        if module.configs.is_empty() {
            md.push_str("_no configs_\n\n");
            continue;
        }
        md.push_str("| name | file | value | source |\n|---|---|---|---|\n");
        for c in &module.configs {
            let value = match (&c.value, c.is_hidden && !reveal_hidden) {
                (None, _) => "(unresolved)".to_string(),
                (Some(_), true) => MASK.to_string(),
                (Some(v), false) => format!("`{}`", v),
            };
            let selected = if c.is_selected { "" } else { " _(unselected)_" };
            md.push_str(&format!(
                "| {}{} | {} | {} | {} |\n",
                c.name,
                selected,
                c.file_location,
                value,
                source_label(c.source)
            ));
        }
        md.push('\n');
    }

    md
}

pub fn format_templates_markdown(templates: &[TemplateSummary]) -> String {
    let mut md = format!("# Templates ({})\n\n", templates.len());
    for t in templates {
        md.push_str(&format!(
            "- **{}** `{}` ({} versions, latest {})\n",
            t.name,
            t.id,
            t.version_count,
            t.latest_version.as_deref().unwrap_or("-")
        ));
    }
    md
}

/// Template header plus its version graph, one line per version indented by
/// lineage.
pub fn format_template_markdown(template: &ProjectTemplate, graph: &[GraphRow]) -> String {
    let mut md = format!("# {}\n", template.name);
    md.push_str(&format!("- **id**: `{}`\n", template.id));
    if !template.description.is_empty() {
        md.push_str(&format!("- **description**: {}\n", template.description));
    }
    md.push_str("\n## Versions\n\n");

    for row in graph {
        let Some(version) = template.versions.iter().find(|v| v.id == row.version_id) else {
            continue;
        };
        let deprecated = if version.status == VersionStatus::Deprecated {
            " ~~deprecated~~"
        } else {
            ""
        };
        md.push_str(&format!(
            "{}- {} `{}` [{}] {} globals, {} modules{}\n",
            "  ".repeat(row.lineage),
            version.version,
            version.id,
            version.version_type.as_str(),
            version.global_configs.len(),
            version.modules.len(),
            deprecated
        ));
    }
    md
}

pub fn format_merge_markdown(preview: &MergePreview) -> String {
    let mut md = format!(
        "# Merge {} into {}\n\n",
        preview.source_version, preview.target_version
    );
    if preview.is_empty() {
        md.push_str("No differences.\n");
        return md;
    }
    for change in &preview.changes {
        let marker = match change.kind {
            ChangeKind::Added => "+",
            ChangeKind::Removed => "-",
            ChangeKind::Modified => "~",
        };
        md.push_str(&format!("{} {} `{}`", marker, change.scope, change.key));
        if !change.fields.is_empty() {
            md.push_str(&format!(" ({})", change.fields.join(", ")));
        }
        md.push('\n');
    }
    md
}

/// Convert markdown to JSON value for uniform response handling.
pub fn markdown_to_json(md: String) -> Value {
    serde_json::json!({
        "format": "markdown",
        "content": md
    })
}
