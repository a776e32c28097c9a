//! Client-side reply-tree state: a flat arena keyed by post id with a
//! parent-to-children index, mirroring what the server returns, plus
//! the targeted "tree surgery" the UI performs optimistically after a
//! reply, edit, delete, or reaction without refetching the thread.

use std::collections::HashMap;

use crate::format;
use crate::site;
use crate::tree::PostView;
use crate::util;

/// Viewport breakpoint below which the mobile display cap applies.
pub const MOBILE_BREAKPOINT_PX: u32 = 768;

/// Display depth cap for the current viewport width; recomputed on
/// every resize. Independent of the server's fetch ceiling.
pub fn display_depth(width_px: u32, desktop: usize, mobile: usize) -> usize {
    if width_px >= MOBILE_BREAKPOINT_PX {
        desktop
    } else {
        mobile
    }
}

/// Per-node interaction state. Opening a compose box on one node does
/// not force-close boxes elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeMode {
    #[default]
    Viewing,
    Replying,
    Editing,
}

/// A node as handed to the presentation layer. When the display cap
/// stops recursion, `more_replies` carries the count of hidden
/// descendants for the "view N more replies" affordance.
#[derive(Debug, Clone)]
pub struct RenderedNode {
    pub post:         PostView,
    pub mode:         NodeMode,
    pub time_display: String,
    pub timestamp:    String,
    pub children:     Vec<RenderedNode>,
    pub more_replies: Option<u64>,
}

pub struct ReplyTreeState {
    nodes:    HashMap<u64, PostView>,
    children: HashMap<Option<u64>, Vec<u64>>,
    modes:    HashMap<u64, NodeMode>,
    roots:    Vec<u64>,
}

impl ReplyTreeState {
    pub fn new() -> ReplyTreeState {
        ReplyTreeState { nodes:    HashMap::new(),
                         children: HashMap::new(),
                         modes:    HashMap::new(),
                         roots:    Vec::new(), }
    }

    /// Normalize a nested server response into the flat arena. On a
    /// thread page the roots carry no parent; on a branch view they
    /// carry the branch post's id, which never joins the arena. Either
    /// way a view whose parent is absent becomes a root.
    pub fn from_views(views: Vec<PostView>) -> ReplyTreeState {
        let mut state = ReplyTreeState::new();
        for view in views {
            state.absorb(view);
        }
        state
    }

    fn absorb(&mut self, mut view: PostView) {
        let nested = view.children.take();
        self.attach(view);

        if let Some(nested) = nested {
            for child in nested {
                self.absorb(child);
            }
        }
    }

    /// Index a single view into the arena. A view whose id is already
    /// present only refreshes the node; the child and root lists are
    /// left untouched so the tree cannot grow duplicate entries.
    fn attach(&mut self, view: PostView) {
        let id = view.id;
        let parent = view.parent_id;

        if self.nodes.insert(id, view).is_some() {
            return;
        }

        self.children.entry(parent).or_default().push(id);
        match parent {
            Some(pid) if self.nodes.contains_key(&pid) => {},
            _ => self.roots.push(id),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&PostView> {
        self.nodes.get(&id)
    }

    /// Optimistic insert of a freshly posted reply: only the new node
    /// and its parent's child list change.
    pub fn insert_reply(&mut self, mut view: PostView) {
        view.children = None;
        let id = view.id;
        self.attach(view);
        self.modes.insert(id, NodeMode::Viewing);
    }

    /// Replace a node's content in place after an edit round-trip (or
    /// optimistically before it).
    pub fn apply_edit(&mut self, id: u64, content: &str) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.content = content.to_string();
                node.content_html = format::render_body(content);
                node.edited = true;
                node.edited_at = Some(util::timestamp());
                self.modes.insert(id, NodeMode::Viewing);
                true
            },
            None => false,
        }
    }

    /// Refresh a node from the server-rendered version (after the
    /// follow-up single-post fetch).
    pub fn replace(&mut self, mut view: PostView) -> bool {
        view.children = None;
        match self.nodes.get_mut(&view.id) {
            Some(node) => {
                *node = view;
                true
            },
            None => false,
        }
    }

    /// Redact a deleted node in place; its subtree stays attached and
    /// navigable, exactly as the server will serialize it from now on.
    pub fn mark_deleted(&mut self, id: u64, by_staff: bool) -> bool {
        let deletion = if by_staff {
            site::Deletion::ByStaff
        } else {
            site::Deletion::ByAuthor
        };

        match self.nodes.get_mut(&id) {
            Some(node) => {
                let sentinel = deletion.sentinel();
                node.deleted = true;
                node.user_id = String::new();
                node.username = String::from(sentinel);
                node.content = String::from(sentinel);
                node.content_html = format::html_escape(sentinel);
                self.modes.insert(id, NodeMode::Viewing);
                true
            },
            None => false,
        }
    }

    pub fn set_score(&mut self, id: u64, score: i64) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.reputation = Some(score);
                true
            },
            None => false,
        }
    }

    pub fn mode(&self, id: u64) -> NodeMode {
        self.modes.get(&id).copied().unwrap_or_default()
    }

    pub fn begin_reply(&mut self, id: u64) -> bool {
        if self.nodes.contains_key(&id) {
            self.modes.insert(id, NodeMode::Replying);
            true
        } else {
            false
        }
    }

    /// Editing is offered only on the viewer's own live posts, or to
    /// staff.
    pub fn begin_edit(&mut self, id: u64, viewer_uuid: &str, viewer_is_staff: bool) -> bool {
        let allowed = match self.nodes.get(&id) {
            Some(node) => !node.deleted && (viewer_is_staff || node.user_id == viewer_uuid),
            None => false,
        };

        if allowed {
            self.modes.insert(id, NodeMode::Editing);
        }
        allowed
    }

    pub fn close_composer(&mut self, id: u64) {
        self.modes.insert(id, NodeMode::Viewing);
    }

    fn descendant_count(&self, id: u64) -> u64 {
        let mut count = 0;
        if let Some(kids) = self.children.get(&Some(id)) {
            for &kid in kids {
                count += 1 + self.descendant_count(kid);
            }
        }
        count
    }

    fn render_node(&self, id: u64, depth: usize, cap: usize) -> RenderedNode {
        let post = self.nodes.get(&id).expect("indexed id missing from arena");

        let (children, more_replies) = if depth + 1 >= cap {
            let hidden = self.descendant_count(id);
            (vec![], if hidden > 0 { Some(hidden) } else { None })
        } else {
            let rendered = self
                .children
                .get(&Some(id))
                .map(|kids| {
                    kids.iter()
                        .map(|&kid| self.render_node(kid, depth + 1, cap))
                        .collect()
                })
                .unwrap_or_default();
            (rendered, None)
        };

        RenderedNode { post:         post.clone(),
                       mode:         self.mode(id),
                       time_display: format::humanise_time(post.created_at),
                       timestamp:    format::utc_timestamp(post.created_at),
                       children,
                       more_replies, }
    }

    /// Materialize the nested view, stopping at the display cap. The
    /// DOM stays bounded no matter how deep the true thread runs; the
    /// affordance links into a branch view instead.
    pub fn render(&self, cap: usize) -> Vec<RenderedNode> {
        if cap == 0 {
            return vec![];
        }

        self.roots
            .iter()
            .map(|&id| self.render_node(id, 0, cap))
            .collect()
    }
}

impl Default for ReplyTreeState {
    fn default() -> Self {
        ReplyTreeState::new()
    }
}

/// Monotonic token issuer for tree fetches: a response is applied only
/// if no newer fetch has been started since it left, so a slow
/// response can never overwrite a fresher tree.
#[derive(Debug, Default)]
pub struct FetchSequencer {
    issued: u64,
}

impl FetchSequencer {
    pub fn new() -> FetchSequencer {
        FetchSequencer { issued: 0 }
    }

    pub fn begin(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn is_current(&self, token: u64) -> bool {
        token == self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: u64, parent: Option<u64>, user: &str, content: &str) -> PostView {
        PostView { id,
                   thread_id: 1,
                   parent_id: parent,
                   user_id: format!("u-{}", user),
                   username: user.to_string(),
                   content: content.to_string(),
                   content_html: format::render_body(content),
                   created_at: id,
                   edited: false,
                   edited_at: None,
                   deleted: false,
                   reputation: None,
                   children: None, }
    }

    fn chain(len: u64) -> ReplyTreeState {
        let mut state = ReplyTreeState::new();
        let mut parent = None;
        for id in 1..=len {
            state.insert_reply(view(id, parent, "alice", &format!("level {}", id)));
            parent = Some(id);
        }
        state
    }

    #[test]
    fn normalizes_nested_views() {
        let mut r1 = view(1, None, "alice", "top");
        let r2 = view(2, Some(1), "bob", "nested");
        r1.children = Some(vec![r2]);

        let state = ReplyTreeState::from_views(vec![r1]);
        assert_eq!(state.len(), 2);
        assert_eq!(state.get(2).unwrap().parent_id, Some(1));

        let rendered = state.render(10);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].children[0].post.id, 2);
    }

    #[test]
    fn renders_a_branch_view_rooted_below_the_top_level() {
        // A branch fetch returns a subtree whose root still names its
        // parent in the wider thread; that parent is not in the arena.
        let mut root = view(4, Some(3), "alice", "branch root");
        root.children = Some(vec![view(5, Some(4), "bob", "leaf")]);

        let state = ReplyTreeState::from_views(vec![root]);
        assert_eq!(state.len(), 2);

        let rendered = state.render(10);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].post.id, 4);
        assert_eq!(rendered[0].children[0].post.id, 5);
    }

    #[test]
    fn reinserting_an_existing_id_does_not_duplicate_it() {
        let mut state = ReplyTreeState::from_views(vec![view(1, None, "alice", "a")]);
        state.insert_reply(view(2, Some(1), "bob", "b"));
        state.insert_reply(view(2, Some(1), "bob", "b again"));

        let rendered = state.render(10);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].children.len(), 1);
    }

    #[test]
    fn insert_reply_touches_only_the_target_branch() {
        let mut state = ReplyTreeState::from_views(vec![view(1, None, "alice", "a")]);
        state.insert_reply(view(2, Some(1), "bob", "b"));
        state.insert_reply(view(3, Some(1), "carol", "c"));

        let rendered = state.render(10);
        let kids = &rendered[0].children;
        assert_eq!(kids.len(), 2);
        // Append order, matching server-side creation order.
        assert_eq!(kids[0].post.id, 2);
        assert_eq!(kids[1].post.id, 3);
    }

    #[test]
    fn display_cap_emits_view_more_with_hidden_count() {
        let state = chain(8);

        let rendered = state.render(5);
        let mut cursor = &rendered[0];
        for _ in 0..4 {
            assert!(cursor.more_replies.is_none());
            cursor = &cursor.children[0];
        }

        // Fifth level rendered, three descendants hidden behind the
        // affordance.
        assert!(cursor.children.is_empty());
        assert_eq!(cursor.more_replies, Some(3));
    }

    #[test]
    fn no_affordance_when_nothing_is_hidden() {
        let state = chain(5);
        let rendered = state.render(5);

        let mut cursor = &rendered[0];
        while !cursor.children.is_empty() {
            cursor = &cursor.children[0];
        }
        assert_eq!(cursor.more_replies, None);
    }

    #[test]
    fn mobile_and_desktop_caps() {
        assert_eq!(display_depth(1280, 10, 5), 10);
        assert_eq!(display_depth(767, 10, 5), 5);
        assert_eq!(display_depth(MOBILE_BREAKPOINT_PX, 10, 5), 10);
    }

    #[test]
    fn delete_redacts_in_place_and_keeps_children() {
        let mut state = chain(3);
        assert!(state.mark_deleted(2, true));

        let rendered = state.render(10);
        let deleted = &rendered[0].children[0];
        assert!(deleted.post.deleted);
        assert_eq!(deleted.post.content, "[Deleted by staff]");
        assert_eq!(deleted.post.username, "[Deleted by staff]");
        assert_eq!(deleted.children.len(), 1);
        assert_eq!(deleted.children[0].post.id, 3);
    }

    #[test]
    fn edit_modes_are_guarded_and_independent() {
        let mut state = ReplyTreeState::from_views(vec![
            view(1, None, "alice", "a"),
            view(2, None, "bob", "b"),
        ]);

        assert!(!state.begin_edit(1, "u-bob", false));
        assert!(state.begin_edit(1, "u-alice", false));
        assert!(state.begin_edit(2, "u-mod", true));

        // Both composers stay open; one does not close the other.
        assert_eq!(state.mode(1), NodeMode::Editing);
        assert_eq!(state.mode(2), NodeMode::Editing);

        assert!(state.apply_edit(1, "hello @bob"));
        assert_eq!(state.mode(1), NodeMode::Viewing);
        let node = state.get(1).unwrap();
        assert!(node.edited);
        assert!(node.edited_at.is_some());
        assert!(node.content_html.contains("/profile/bob"));

        // A deleted node cannot enter editing, even for its author.
        state.mark_deleted(2, false);
        assert!(!state.begin_edit(2, "u-bob", false));
    }

    #[test]
    fn stale_fetch_tokens_are_rejected() {
        let mut seq = FetchSequencer::new();
        let first = seq.begin();
        let second = seq.begin();

        assert!(!seq.is_current(first));
        assert!(seq.is_current(second));
    }
}
