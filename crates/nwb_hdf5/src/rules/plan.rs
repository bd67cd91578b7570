use super::{Phase, Rule, RuleContext};
use crate::error::Result;
use crate::flatten::SourceItem;
use crate::result::{QueueItem, ReadResult};

/// Prune groups with no attributes whose children are all empty groups
/// (or that have no children at all).
pub struct PruneEmptyGroups;

fn is_bare(item: &SourceItem) -> bool {
    item.is_group() && item.attrs.is_empty()
}

impl Rule for PruneEmptyGroups {
    fn name(&self) -> &'static str {
        "prune_empty_groups"
    }

    fn phase(&self) -> Phase {
        Phase::Plan
    }

    fn priority(&self) -> u32 {
        0
    }

    fn check(&self, item: &QueueItem, ctx: &RuleContext<'_>) -> bool {
        let QueueItem::Source(item) = item else {
            return false;
        };
        if !is_bare(item) || item.path == "/" {
            return false;
        }
        item.children.values().all(|child| {
            ctx.items
                .get(child)
                .is_some_and(|child| is_bare(child) && child.children.is_empty())
        })
    }

    fn apply(&self, item: &QueueItem, _ctx: &RuleContext<'_>) -> Result<ReadResult> {
        Ok(ReadResult::new(item.source(), self.name()).complete(None))
    }
}
