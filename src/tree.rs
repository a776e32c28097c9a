use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db;
use crate::format;
use crate::site;
use crate::util::ForumErr;

const UNKNOWN_AUTHOR: &str = "[unknown]";

/// A post as serialized to clients. `children` is present on
/// tree-shaped responses only; `reputation` on single-post responses
/// only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id:           u64,
    pub thread_id:    u64,
    pub parent_id:    Option<u64>,
    pub user_id:      String,
    pub username:     String,
    pub content:      String,
    pub content_html: String,
    pub created_at:   u64,
    pub edited:       bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at:    Option<u64>,
    pub deleted:      bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation:   Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children:     Option<Vec<PostView>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadView {
    pub id:          u64,
    pub user_id:     String,
    pub username:    String,
    pub title:       String,
    pub content:     String,
    pub content_html: String,
    pub category_id: u64,
    pub sticky:      bool,
    pub private:     bool,
    pub deleted:     bool,
    pub created_at:  u64,
}

/// Soft-deleted rows stay in every tree; only their body and author
/// are masked, at serialization time.
fn view_post(post: &site::Post, usernames: &HashMap<String, String>) -> PostView {
    let (user_id, username, content, content_html) = if post.deletion.is_deleted() {
        let sentinel = post.deletion.sentinel();
        (
            String::new(),
            String::from(sentinel),
            String::from(sentinel),
            format::html_escape(sentinel),
        )
    } else {
        let username = usernames
            .get(&post.author_uuid)
            .cloned()
            .unwrap_or_else(|| String::from(UNKNOWN_AUTHOR));
        (
            post.author_uuid.clone(),
            username,
            post.body.clone(),
            format::render_body(&post.body),
        )
    };

    PostView { id: post.id,
               thread_id: post.thread_id,
               parent_id: post.parent_id,
               user_id,
               username,
               content,
               content_html,
               created_at: post.created_at,
               edited: post.edited,
               edited_at: post.edited_at,
               deleted: post.deletion.is_deleted(),
               reputation: None,
               children: None, }
}

pub fn view_thread(thread: &site::Thread, author_username: Option<&str>) -> ThreadView {
    let (user_id, username, title, content) = if thread.deletion.is_deleted() {
        let sentinel = thread.deletion.sentinel();
        (
            String::new(),
            String::from(sentinel),
            String::from(sentinel),
            String::from(sentinel),
        )
    } else {
        (
            thread.author_uuid.clone(),
            String::from(author_username.unwrap_or(UNKNOWN_AUTHOR)),
            thread.title.clone(),
            thread.body.clone(),
        )
    };

    let content_html = format::render_body(&content);

    ThreadView { id: thread.id,
                 user_id,
                 username,
                 title,
                 content,
                 content_html,
                 category_id: thread.category_id,
                 sticky: thread.sticky,
                 private: thread.private,
                 deleted: thread.deletion.is_deleted(),
                 created_at: thread.created_at, }
}

/// In-memory arena over one thread's posts: every row fetched once,
/// indexed parent-to-children, walked with an explicit depth bound.
/// No per-level queries and no unbounded pointer chasing.
struct Arena<'p> {
    posts:     &'p [site::Post],
    children:  HashMap<Option<u64>, Vec<usize>>,
    usernames: HashMap<String, String>,
}

impl<'p> Arena<'p> {
    fn build<DB: db::Database>(database: &DB, posts: &'p [site::Post]) -> Result<Self, ForumErr> {
        let mut children: HashMap<Option<u64>, Vec<usize>> = HashMap::new();
        for (idx, post) in posts.iter().enumerate() {
            children.entry(post.parent_id).or_default().push(idx);
        }

        let mut uuids: Vec<String> = posts.iter().map(|p| p.author_uuid.clone()).collect();
        uuids.sort();
        uuids.dedup();

        let mut usernames = HashMap::new();
        for user in database.get_users_by_uuids(&uuids)? {
            usernames.insert(user.uuid, user.username);
        }

        Ok(Arena { posts,
                   children,
                   usernames, })
    }

    /// Children of `parent` with their subtrees attached. Recursion is
    /// bounded by `max_depth`; anything deeper is silently omitted,
    /// signalling truncation is the client's concern.
    fn subtree(&self, parent: Option<u64>, depth: usize, max_depth: usize) -> Vec<PostView> {
        if depth >= max_depth {
            return vec![];
        }

        let mut views = vec![];
        if let Some(indices) = self.children.get(&parent) {
            for &idx in indices {
                let post = &self.posts[idx];
                let mut view = view_post(post, &self.usernames);
                view.children = Some(self.subtree(Some(post.id), depth + 1, max_depth));
                views.push(view);
            }
        }
        views
    }
}

/// The descendant tree beneath one post (or beneath the thread root
/// when `parent` is None), up to `max_depth` levels.
pub fn reply_tree<DB: db::Database>(
    database: &DB,
    thread_id: u64,
    parent: Option<u64>,
    max_depth: usize,
) -> Result<Vec<PostView>, ForumErr> {
    let posts = database.get_thread_posts(thread_id)?;
    let arena = Arena::build(database, &posts)?;
    Ok(arena.subtree(parent, 0, max_depth))
}

pub struct RepliesPage {
    pub replies: Vec<PostView>,
    pub total:   u64,
}

/// One page of top-level replies, each with its full descendant tree
/// pre-attached, plus the total top-level count for pagination.
pub fn thread_replies<DB: db::Database>(
    database: &DB,
    thread_id: u64,
    page: u64,
    limit: u64,
    max_depth: usize,
) -> Result<RepliesPage, ForumErr> {
    let page_rows = database.top_level_replies(thread_id, page, limit)?;

    let posts = database.get_thread_posts(thread_id)?;
    let arena = Arena::build(database, &posts)?;

    let mut replies = vec![];
    for post in &page_rows.posts {
        let mut view = view_post(post, &arena.usernames);
        view.children = Some(arena.subtree(Some(post.id), 1, max_depth));
        replies.push(view);
    }

    Ok(RepliesPage { replies,
                     total: page_rows.total, })
}

pub struct Branch {
    pub parent:  PostView,
    pub replies: Vec<PostView>,
}

/// One post plus its full descendant tree; serves the client's
/// "view more replies" zoom past the display depth cap.
pub fn reply_branch<DB: db::Database>(
    database: &DB,
    thread_id: u64,
    post_id: u64,
    max_depth: usize,
) -> Result<Branch, ForumErr> {
    let root = database.get_post(post_id)?;
    if root.thread_id != thread_id {
        return Err(ForumErr::not_found(format!(
            "post {} is not in thread {}",
            post_id, thread_id
        )));
    }

    let posts = database.get_thread_posts(thread_id)?;
    let arena = Arena::build(database, &posts)?;

    let parent = view_post(&root, &arena.usernames);
    let replies = arena.subtree(Some(post_id), 0, max_depth);

    Ok(Branch { parent, replies })
}

/// A single post, rendered, with its net score attached; used to
/// refresh a just-created or just-edited node client-side.
pub fn single_post<DB: db::Database>(database: &DB, post_id: u64) -> Result<PostView, ForumErr> {
    let post = database.get_post(post_id)?;

    let uuids = vec![post.author_uuid.clone()];
    let mut usernames = HashMap::new();
    for user in database.get_users_by_uuids(&uuids)? {
        usernames.insert(user.uuid, user.username);
    }

    let mut view = view_post(&post, &usernames);
    view.reputation = Some(database.score(post_id)?);
    Ok(view)
}
