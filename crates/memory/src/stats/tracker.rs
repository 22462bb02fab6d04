//! Hierarchical allocator-usage tracker.
//!
//! The tracker is pure diagnostics: it never intercepts allocations, it only
//! remembers which allocators are logical children of which and reads their
//! [`MemoryUsage`] counters when asked for a report.

use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::RwLock;

#[cfg(feature = "logging")]
use tracing::debug;

use crate::core::types::size::KB;
use crate::core::MemoryUsage;

/// An allocator as the tracker sees it: its usage surface, shared.
pub type TrackedAllocator = Arc<dyn MemoryUsage + Send + Sync>;

/// One node of the tracking tree.
struct Node {
    /// `None` marks a pass-through group node (the root sentinel); group
    /// nodes are skipped when printing but their children are still visited.
    allocator: Option<TrackedAllocator>,
    children: Vec<Node>,
}

impl Node {
    fn leaf(allocator: TrackedAllocator) -> Self {
        Self {
            allocator: Some(allocator),
            children: Vec::new(),
        }
    }

    /// Depth-first identity search for the node tracking `target`.
    ///
    /// Identity, not equality: two registrations of the same `Arc` resolve
    /// to the first node found in pre-order.
    fn find(&mut self, target: &TrackedAllocator) -> Option<&mut Node> {
        if self
            .allocator
            .as_ref()
            .is_some_and(|a| Arc::ptr_eq(a, target))
        {
            return Some(self);
        }
        for child in &mut self.children {
            if let Some(found) = child.find(target) {
                return Some(found);
            }
        }
        None
    }

    fn render(&self, depth: usize, out: &mut String) {
        let child_depth = match &self.allocator {
            Some(allocator) => {
                let _ = writeln!(
                    out,
                    "{:indent$}{}: {} allocations, {} KB",
                    "",
                    allocator.name(),
                    allocator.allocation_count(),
                    allocator.bytes_allocated() / KB,
                    indent = depth * 2
                );
                depth + 1
            }
            // Group nodes do not print and do not consume a depth level.
            None => depth,
        };
        for child in &self.children {
            child.render(child_depth, out);
        }
    }
}

/// Registry of allocators arranged as a tree for usage reporting.
///
/// Construct one per process (or per subsystem) and thread it to wherever
/// allocators are created; there is no ambient global instance. Registration
/// and reporting are internally locked so the tracker can sit behind an
/// `Arc`, but it is designed for a single diagnostics thread.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use bedrock_memory::allocator::SystemAllocator;
/// use bedrock_memory::stats::{TrackedAllocator, UsageTracker};
///
/// let tracker = UsageTracker::new();
/// let system: TrackedAllocator = Arc::new(SystemAllocator::new());
/// tracker.register_allocator(Arc::clone(&system), None);
/// println!("{}", tracker.report());
/// ```
pub struct UsageTracker {
    root: RwLock<Node>,
}

impl UsageTracker {
    /// Creates an empty tracker with a pass-through root node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Node {
                allocator: None,
                children: Vec::new(),
            }),
        }
    }

    /// Assigns the allocator reported at the root of the tree, ahead of all
    /// registered children (typically the host heap).
    pub fn set_allocator(&self, allocator: TrackedAllocator) {
        self.root.write().allocator = Some(allocator);
    }

    /// Adds `allocator` to the tree under `parent`.
    ///
    /// A `None` parent attaches directly under the root. A parent that has
    /// never been registered is first given a node of its own under the
    /// root, so registration order between parents and children does not
    /// matter.
    pub fn register_allocator(&self, allocator: TrackedAllocator, parent: Option<&TrackedAllocator>) {
        let mut root = self.root.write();

        #[cfg(feature = "logging")]
        debug!(name = allocator.name(), "registering allocator");

        match parent {
            None => root.children.push(Node::leaf(allocator)),
            Some(parent) => {
                if root.find(parent).is_none() {
                    root.children.push(Node::leaf(Arc::clone(parent)));
                }
                root.find(parent)
                    .expect("parent node exists after insertion")
                    .children
                    .push(Node::leaf(allocator));
            }
        }
    }

    /// Renders the usage report: one line per concrete allocator, pre-order,
    /// indented two spaces per tree level.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = String::new();
        self.root.read().render(0, &mut out);
        out
    }

    /// Prints the usage report to stdout.
    pub fn console_dump(&self) {
        print!("{}", self.report());
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeAllocator {
        name: &'static str,
        bytes: usize,
        count: usize,
    }

    impl MemoryUsage for FakeAllocator {
        fn name(&self) -> &str {
            self.name
        }

        fn bytes_allocated(&self) -> usize {
            self.bytes
        }

        fn allocation_count(&self) -> usize {
            self.count
        }
    }

    fn fake(name: &'static str, bytes: usize, count: usize) -> TrackedAllocator {
        Arc::new(FakeAllocator { name, bytes, count })
    }

    #[test]
    fn report_lists_registered_allocators() {
        let tracker = UsageTracker::new();
        tracker.register_allocator(fake("heap", 4096, 3), None);

        let report = tracker.report();
        assert_eq!(report, "heap: 3 allocations, 4 KB\n");
    }

    #[test]
    fn children_are_indented_under_their_parent() {
        let tracker = UsageTracker::new();
        let parent = fake("frame", 2048, 1);
        tracker.register_allocator(Arc::clone(&parent), None);
        tracker.register_allocator(fake("particles", 1024, 8), Some(&parent));

        let report = tracker.report();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "frame: 1 allocations, 2 KB");
        assert_eq!(lines[1], "  particles: 8 allocations, 1 KB");
    }

    #[test]
    fn unknown_parent_is_created_under_root() {
        let tracker = UsageTracker::new();
        let parent = fake("scratch", 0, 0);
        // Parent was never registered; registering a child must create it.
        tracker.register_allocator(fake("strings", 512, 2), Some(&parent));

        let report = tracker.report();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "scratch: 0 allocations, 0 KB");
        assert_eq!(lines[1], "  strings: 2 allocations, 0 KB");
    }

    #[test]
    fn root_allocator_prints_first_and_indents_children() {
        let tracker = UsageTracker::new();
        tracker.set_allocator(fake("system", 1024 * 1024, 10));
        tracker.register_allocator(fake("pool", 65536, 4), None);

        let report = tracker.report();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "system: 10 allocations, 1024 KB");
        assert_eq!(lines[1], "  pool: 4 allocations, 64 KB");
    }

    #[test]
    fn group_root_is_skipped_but_children_print() {
        let tracker = UsageTracker::new();
        tracker.register_allocator(fake("a", 0, 0), None);
        tracker.register_allocator(fake("b", 0, 0), None);

        // No root allocator set: both children print at depth 0.
        let report = tracker.report();
        assert_eq!(report, "a: 0 allocations, 0 KB\nb: 0 allocations, 0 KB\n");
    }

    #[test]
    fn deep_hierarchy_indents_per_level() {
        let tracker = UsageTracker::new();
        let gp = fake("engine", 0, 0);
        let p = fake("world", 0, 0);
        tracker.register_allocator(Arc::clone(&gp), None);
        tracker.register_allocator(Arc::clone(&p), Some(&gp));
        tracker.register_allocator(fake("entities", 0, 0), Some(&p));

        let report = tracker.report();
        let lines: Vec<&str> = report.lines().collect();
        assert!(lines[0].starts_with("engine"));
        assert!(lines[1].starts_with("  world"));
        assert!(lines[2].starts_with("    entities"));
    }
}
