//! Typed batch request model.
//!
//! These records are closed (`deny_unknown_fields`) and serialize to the
//! renderer wire format with unset fields omitted.

use serde::{Deserialize, Serialize};

/// A batch of diagrams plus the configuration shared by all of them.
///
/// Order of `diagrams` is significant: it is the only correlation between
/// input diagrams and the images the renderer returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    /// Diagrams to render, in order.
    #[serde(rename = "mmd")]
    pub diagrams: Vec<DiagramRequest>,
    /// Mermaid configuration applied to every diagram.
    #[serde(rename = "mmd_config", default)]
    pub mermaid_config: MermaidConfig,
    /// Post-processing settings.
    #[serde(rename = "config", default)]
    pub app_config: AppConfig,
}

impl BatchRequest {
    /// Number of diagrams in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.diagrams.len()
    }

    /// Whether the batch has no diagrams.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagrams.is_empty()
    }
}

/// A single diagram to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagramRequest {
    /// Diagram source, passed to the renderer unmodified.
    pub code: String,
    /// Per-diagram Mermaid configuration, merged over the global one by the renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<MermaidConfig>,
}

impl DiagramRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            config: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: MermaidConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Application settings. Governs post-processing, not rendered content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    /// Border added around the trimmed image, in pixels. `0` disables the border.
    pub margin: f64,
    /// Maximum diagram width in pixels (`-1` lets the renderer pick the window width).
    pub max_width: i64,
    /// Renderer window width in pixels (`-1` for the renderer default).
    pub width: i64,
    /// Renderer zoom factor.
    pub zoom: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            margin: 20.0,
            max_width: -1,
            width: -1,
            zoom: 1.0,
        }
    }
}

impl AppConfig {
    /// Margin rounded to whole pixels.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn margin_px(&self) -> u32 {
        // Validation guarantees a non-negative margin.
        self.margin.max(0.0).round().min(f64::from(u32::MAX)) as u32
    }
}

/// Mermaid configuration (global `mmd_config` or per-diagram `config`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct MermaidConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrow_marker_absolute: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub er: Option<ErConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flowchart: Option<FlowchartConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<SequenceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gantt: Option<GanttConfig>,
}

impl MermaidConfig {
    /// Configuration that only sets the theme.
    pub fn themed(theme: impl Into<String>) -> Self {
        Self {
            theme: Some(theme.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct ErConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagram_padding: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_entity_width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_entity_height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_padding: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_max_width: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct FlowchartConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagram_padding: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_labels: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct SequenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagram_margin_x: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagram_margin_y: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_margin: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_margin: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_text_margin: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_margin: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_margin: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_align: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_actors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_margin_adj: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_max_width: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_angles: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_sequence_numbers: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct GanttConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_top_margin: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bar_height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bar_gap: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_padding: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_padding: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_line_start_padding: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_section_styles: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axis_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_axis: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_default_batch_serializes_minimal() {
        let request = BatchRequest {
            diagrams: vec![DiagramRequest::new("flowchart TD\n a --> b")],
            mermaid_config: MermaidConfig::default(),
            app_config: AppConfig::default(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "mmd": [{ "code": "flowchart TD\n a --> b" }],
                "mmd_config": {},
                "config": { "margin": 20.0, "max_width": -1, "width": -1, "zoom": 1.0 }
            })
        );
    }

    #[test]
    fn test_camel_case_family_fields() {
        let config = MermaidConfig {
            sequence: Some(SequenceConfig {
                diagram_margin_x: Some(10),
                show_sequence_numbers: Some(true),
                ..SequenceConfig::default()
            }),
            ..MermaidConfig::themed("forest")
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            json!({
                "theme": "forest",
                "sequence": { "diagramMarginX": 10, "showSequenceNumbers": true }
            })
        );
    }

    #[test]
    fn test_unknown_field_rejected_by_typed_record() {
        let result: Result<FlowchartConfig, _> = serde_json::from_value(json!({ "curvee": "basis" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_margin_px_rounds() {
        let mut app = AppConfig::default();
        assert_eq!(app.margin_px(), 20);
        app.margin = 2.5;
        assert_eq!(app.margin_px(), 3);
        app.margin = 0.0;
        assert_eq!(app.margin_px(), 0);
    }
}
