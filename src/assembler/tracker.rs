use std::collections::HashMap;

use tracing::warn;

use crate::message::{ContentBlock, ToolInvocation, ToolStatus};

/// Id-keyed index over a message's block list.
///
/// Completion events may arrive out of start order when the upstream
/// pipelines tool calls, so lookups key strictly by invocation id, never
/// by block position. Entries are only ever added; nothing is removed
/// mid-session.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    index_by_id: HashMap<String, usize>,
}

/// Idempotent partial update applied through [`ToolCallTracker::upsert`].
#[derive(Debug, Clone, Default)]
pub struct ToolPatch {
    pub name: Option<String>,
    pub input: Option<serde_json::Value>,
    pub status: Option<ToolStatus>,
    pub append_result: Option<String>,
}

impl ToolCallTracker {
    /// Rebuild the index from a block list, preserving first-seen order.
    pub fn for_blocks(blocks: &[ContentBlock]) -> Self {
        let mut index_by_id = HashMap::new();
        for (position, block) in blocks.iter().enumerate() {
            if let ContentBlock::Tool(call) = block {
                index_by_id.entry(call.id.clone()).or_insert(position);
            }
        }
        Self { index_by_id }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_by_id.contains_key(id)
    }

    pub fn get<'a>(&self, blocks: &'a [ContentBlock], id: &str) -> Option<&'a ToolInvocation> {
        let position = *self.index_by_id.get(id)?;
        match blocks.get(position) {
            Some(ContentBlock::Tool(call)) => Some(call),
            _ => None,
        }
    }

    /// Patch the invocation for `id`, creating it when unseen.
    ///
    /// Creation on an unknown id is deliberate: a `tool_result_delta` or
    /// `tool_end` whose `tool_start` was lost or reordered must still
    /// land somewhere instead of failing the fold.
    pub fn upsert(&mut self, blocks: &mut Vec<ContentBlock>, id: &str, patch: ToolPatch) {
        if let Some(&position) = self.index_by_id.get(id) {
            match blocks.get_mut(position) {
                Some(ContentBlock::Tool(call)) => {
                    apply_patch(call, patch);
                    return;
                }
                // Stale index: the block list changed underneath us.
                // Degrade to the creation path rather than losing the event.
                _ => warn!(tool_id = %id, position, "tracker index out of sync with blocks"),
            }
        } else {
            warn!(tool_id = %id, "tool event for unseen id, creating invocation");
        }

        let call = ToolInvocation {
            id: id.to_string(),
            name: patch.name.unwrap_or_default(),
            input: patch
                .input
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
            status: patch.status.unwrap_or(ToolStatus::Pending),
            result_text: patch.append_result.unwrap_or_default(),
        };
        self.index_by_id.insert(id.to_string(), blocks.len());
        blocks.push(ContentBlock::Tool(call));
    }

    /// Every invocation in first-seen order.
    pub fn all<'a>(&self, blocks: &'a [ContentBlock]) -> Vec<&'a ToolInvocation> {
        blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Tool(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

fn apply_patch(call: &mut ToolInvocation, patch: ToolPatch) {
    if let Some(name) = patch.name {
        call.name = name;
    }
    if let Some(input) = patch.input {
        call.input = input;
    }
    if let Some(status) = patch.status {
        call.status = status;
    }
    if let Some(chunk) = patch.append_result {
        call.result_text.push_str(&chunk);
    }
}
