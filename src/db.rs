use crate::site;
use crate::util::ForumErr;

/// A page of top-level replies plus the total top-level count.
pub struct ReplyPage {
    pub posts: Vec<site::Post>,
    pub total: u64,
}

/// Everything the forum core needs from the relational store. One
/// implementation exists (SQLite behind an r2d2 pool) but handlers and
/// actions are written against this trait so tests can drive an
/// in-memory database through the exact same paths.
pub trait Database {
    // ── Users ───────────────────────────────────────────────────────

    /// Mirror the authenticated identity into the user table, creating
    /// the XP state row on first sight.
    fn upsert_user(&self, uuid: &str, username: &str, is_staff: bool) -> Result<(), ForumErr>;

    fn get_user(&self, uuid: &str) -> Result<site::User, ForumErr>;

    /// Batch username resolution for mention recording; unknown names
    /// are simply absent from the result.
    fn get_users_by_names(&self, names: &[String]) -> Result<Vec<site::User>, ForumErr>;

    fn get_users_by_uuids(&self, uuids: &[String]) -> Result<Vec<site::User>, ForumErr>;

    /// Atomic XP increment pushed into the store; returns the new
    /// total and the level as currently stored so the engine can
    /// recompute and persist a level change.
    fn apply_xp_delta(&self, uuid: &str, delta: u64, now: u64) -> Result<(u64, u32), ForumErr>;

    fn set_level(&self, uuid: &str, level: u32) -> Result<(), ForumErr>;

    fn set_reputation(&self, uuid: &str, reputation: i64) -> Result<(), ForumErr>;

    // ── Categories / threads ────────────────────────────────────────

    fn create_category(&self, category: &site::Category) -> Result<u64, ForumErr>;

    fn get_category(&self, category_id: u64) -> Result<site::Category, ForumErr>;

    fn create_thread(&self, thread: &site::Thread) -> Result<u64, ForumErr>;

    fn get_thread(&self, thread_id: u64) -> Result<site::Thread, ForumErr>;

    /// Creation time of the author's most recent thread in a category,
    /// used for the application-category rate limit.
    fn latest_thread_time(&self, author_uuid: &str, category_id: u64)
        -> Result<Option<u64>, ForumErr>;

    fn soft_delete_thread(&self, thread_id: u64, by_staff: bool) -> Result<(), ForumErr>;

    // ── Posts ───────────────────────────────────────────────────────

    /// Insert a reply. The parent check (exists, same thread) runs in
    /// the same transaction as the insert so a racing delete cannot
    /// orphan the reference.
    fn create_post(
        &self,
        thread_id: u64,
        author_uuid: &str,
        body: &str,
        parent_id: Option<u64>,
        now: u64,
    ) -> Result<u64, ForumErr>;

    fn get_post(&self, post_id: u64) -> Result<site::Post, ForumErr>;

    /// Every post of a thread in one query; tree assembly indexes the
    /// result in memory rather than issuing per-level queries.
    fn get_thread_posts(&self, thread_id: u64) -> Result<Vec<site::Post>, ForumErr>;

    fn top_level_replies(&self, thread_id: u64, page: u64, limit: u64)
        -> Result<ReplyPage, ForumErr>;

    fn update_post_body(&self, post_id: u64, body: &str, now: u64) -> Result<(), ForumErr>;

    fn soft_delete_post(&self, post_id: u64, by_staff: bool) -> Result<(), ForumErr>;

    // ── Reactions ───────────────────────────────────────────────────

    /// Toggle semantics: no existing row inserts, an identical row is
    /// removed, an opposite row is overwritten in place.
    fn react(
        &self,
        post_id: u64,
        user_uuid: &str,
        kind: site::ReactionKind,
        now: u64,
    ) -> Result<site::ReactOutcome, ForumErr>;

    /// Net score, computed fresh on every call and never cached.
    fn score(&self, post_id: u64) -> Result<i64, ForumErr>;

    // ── Mentions ────────────────────────────────────────────────────

    fn record_mentions(
        &self,
        kind: site::MentionKind,
        post_id: u64,
        uuids: &[String],
        now: u64,
    ) -> Result<(), ForumErr>;
}
