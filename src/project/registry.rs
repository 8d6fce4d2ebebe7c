use std::collections::HashMap;

/// Display metadata for one tool name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDisplayInfo {
    /// Short verb phrase shown next to the invocation ("Querying data").
    pub label: String,
    /// Glyph the UI renders before the label.
    pub icon: String,
}

impl ToolDisplayInfo {
    pub fn new(label: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            icon: icon.into(),
        }
    }
}

/// Tool name -> display metadata, with a required default entry.
///
/// Adding a tool is a data change (one `register` call), never a new
/// dispatch arm. Lookups for unregistered names fall back to the default
/// so an unexpected tool still renders something sensible.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDisplayRegistry {
    entries: HashMap<String, ToolDisplayInfo>,
    default: ToolDisplayInfo,
}

impl ToolDisplayRegistry {
    pub fn new(default: ToolDisplayInfo) -> Self {
        Self {
            entries: HashMap::new(),
            default,
        }
    }

    /// Registry seeded with the dashboard's built-in tools.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new(ToolDisplayInfo::new("Running tool", "·"));
        registry.register("query", ToolDisplayInfo::new("Querying analytics", "◆"));
        registry.register("segment", ToolDisplayInfo::new("Building segment", "◇"));
        registry.register("leaderboard", ToolDisplayInfo::new("Ranking results", "≡"));
        registry.register("export", ToolDisplayInfo::new("Exporting data", "↓"));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, info: ToolDisplayInfo) {
        self.entries.insert(name.into(), info);
    }

    pub fn lookup(&self, name: &str) -> &ToolDisplayInfo {
        self.entries.get(name).unwrap_or(&self.default)
    }
}
