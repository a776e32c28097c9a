use tracing::debug;

use crate::badges::BadgeNotifier;
use crate::config::Config;
use crate::db;
use crate::format;
use crate::mentions;
use crate::site;
use crate::util;
use crate::util::ForumErr;

/// Identity attached by the upstream auth collaborator before any
/// handler in this crate runs.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uuid:     String,
    pub username: String,
    pub is_staff: bool,
}

const SECS_IN_DAY: u64 = 24 * 60 * 60;

/// Write-path orchestration: validation, the word filter, mention
/// recording, and XP awards all hang off these entry points, so
/// handlers stay thin.
pub struct Actions {
    filter:            format::WordFilter,
    badges:            BadgeNotifier,
    thread_limit_days: u64,
}

impl Actions {
    pub fn new(config: &Config) -> Actions {
        Actions { filter:            format::WordFilter::new(&config.banned_words),
                  badges:            BadgeNotifier::new(&config.badges),
                  thread_limit_days: config.thread_limit_days, }
    }

    #[cfg(test)]
    pub fn for_tests() -> Actions {
        Actions { filter:            format::WordFilter::new(&[String::from("grief")]),
                  badges:            BadgeNotifier::disabled(),
                  thread_limit_days: 30, }
    }

    fn record_post_mentions<DB: db::Database>(
        &self,
        database: &DB,
        kind: site::MentionKind,
        post_id: u64,
        body: &str,
    ) -> Result<(), ForumErr> {
        let names = mentions::extract_mentions(body);
        if names.is_empty() {
            return Ok(());
        }

        // One batch lookup; names that do not resolve are dropped.
        let users = database.get_users_by_names(&names)?;
        let uuids: Vec<String> = users.into_iter().map(|u| u.uuid).collect();

        debug!(post_id, mentioned = uuids.len(), "recording mentions");
        database.record_mentions(kind, post_id, &uuids, util::timestamp())
    }

    pub fn create_thread<DB: db::Database>(
        &self,
        database: &DB,
        auth: &AuthUser,
        title: &str,
        body: &str,
        category_id: u64,
    ) -> Result<u64, ForumErr> {
        if title.trim().is_empty() || body.trim().is_empty() {
            return Err(ForumErr::validation("title and content are required"));
        }

        let category = database
            .get_category(category_id)
            .map_err(|_| ForumErr::validation(format!("invalid category {}", category_id)))?;

        if category.staff_only && !auth.is_staff {
            return Err(ForumErr::forbidden("category is restricted to staff"));
        }

        database.upsert_user(&auth.uuid, &auth.username, auth.is_staff)?;

        if category.kind == site::CategoryKind::Application {
            let window = self.thread_limit_days * SECS_IN_DAY;
            if let Some(last) = database.latest_thread_time(&auth.uuid, category_id)? {
                if util::timestamp().saturating_sub(last) < window {
                    return Err(ForumErr::forbidden(format!(
                        "only one thread per {} days in this category",
                        self.thread_limit_days
                    )));
                }
            }
        }

        let thread = site::Thread { id:          0,
                                    author_uuid: auth.uuid.clone(),
                                    title:       self.filter.censor(title),
                                    body:        self.filter.censor(body),
                                    category_id,
                                    sticky:      false,
                                    private:     false,
                                    deletion:    site::Deletion::Live,
                                    created_at:  util::timestamp(), };

        let thread_id = database.create_thread(&thread)?;

        self.record_post_mentions(database, site::MentionKind::Thread, thread_id, &thread.body)?;
        crate::xp::award(database, &self.badges, &auth.uuid, "thread")?;

        Ok(thread_id)
    }

    pub fn create_reply<DB: db::Database>(
        &self,
        database: &DB,
        auth: &AuthUser,
        thread_id: u64,
        content: &str,
        parent_id: Option<u64>,
    ) -> Result<u64, ForumErr> {
        if content.trim().is_empty() {
            return Err(ForumErr::validation("content is required"));
        }

        database.upsert_user(&auth.uuid, &auth.username, auth.is_staff)?;

        let body = self.filter.censor(content);

        // Thread liveness and the same-thread parent check run inside
        // the insert transaction.
        let post_id =
            database.create_post(thread_id, &auth.uuid, &body, parent_id, util::timestamp())?;

        self.record_post_mentions(database, site::MentionKind::Reply, post_id, &body)?;
        crate::xp::award(database, &self.badges, &auth.uuid, "reply")?;

        Ok(post_id)
    }

    pub fn edit_reply<DB: db::Database>(
        &self,
        database: &DB,
        auth: &AuthUser,
        post_id: u64,
        content: &str,
    ) -> Result<(), ForumErr> {
        if content.trim().is_empty() {
            return Err(ForumErr::validation("content is required"));
        }

        let post = database.get_post(post_id)?;

        // Only the original author may change a body; moderators
        // redact through deletion instead.
        if post.author_uuid != auth.uuid {
            return Err(ForumErr::forbidden("only the author may edit this reply"));
        }

        if post.deletion.is_deleted() {
            return Err(ForumErr::forbidden("reply has been deleted"));
        }

        database.update_post_body(post_id, &self.filter.censor(content), util::timestamp())
    }

    pub fn delete_reply<DB: db::Database>(
        &self,
        database: &DB,
        auth: &AuthUser,
        post_id: u64,
    ) -> Result<(), ForumErr> {
        let post = database.get_post(post_id)?;

        let is_author = post.author_uuid == auth.uuid;
        if !is_author && !auth.is_staff {
            return Err(ForumErr::forbidden("not permitted to delete this reply"));
        }

        database.soft_delete_post(post_id, auth.is_staff && !is_author)
    }

    pub fn delete_thread<DB: db::Database>(
        &self,
        database: &DB,
        auth: &AuthUser,
        thread_id: u64,
    ) -> Result<(), ForumErr> {
        let thread = database.get_thread(thread_id)?;

        let is_author = thread.author_uuid == auth.uuid;
        if !is_author && !auth.is_staff {
            return Err(ForumErr::forbidden("not permitted to delete this thread"));
        }

        database.soft_delete_thread(thread_id, auth.is_staff && !is_author)
    }

    /// Toggle a reaction and return the fresh net score. A fresh
    /// upvote awards the post's author reaction-received XP; removals
    /// and kind switches award nothing.
    pub fn react<DB: db::Database>(
        &self,
        database: &DB,
        auth: &AuthUser,
        post_id: u64,
        kind: site::ReactionKind,
    ) -> Result<i64, ForumErr> {
        let post = database.get_post(post_id)?;

        database.upsert_user(&auth.uuid, &auth.username, auth.is_staff)?;

        let outcome = database.react(post_id, &auth.uuid, kind, util::timestamp())?;

        if outcome.is_new_upvote() {
            crate::xp::award(database, &self.badges, &post.author_uuid, "reaction_received")?;
        }

        database.score(post_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::sqlite3db::Sqlite3Database;

    fn alice() -> AuthUser {
        AuthUser { uuid:     String::from("u-alice"),
                   username: String::from("alice"),
                   is_staff: false, }
    }

    fn bob() -> AuthUser {
        AuthUser { uuid:     String::from("u-bob"),
                   username: String::from("bob"),
                   is_staff: false, }
    }

    fn mod_user() -> AuthUser {
        AuthUser { uuid:     String::from("u-mod"),
                   username: String::from("herobrine"),
                   is_staff: true, }
    }

    fn seeded() -> (Sqlite3Database, Actions, u64) {
        let db = Sqlite3Database::in_memory().unwrap();
        let actions = Actions::for_tests();

        let category = site::Category { id:         0,
                                        name:       String::from("General"),
                                        kind:       site::CategoryKind::Standard,
                                        staff_only: false, };
        db.create_category(&category).unwrap();

        let thread_id = actions
            .create_thread(&db, &alice(), "Welcome", "hello everyone", 1)
            .unwrap();

        (db, actions, thread_id)
    }

    #[test]
    fn thread_creation_awards_xp_and_censors() {
        let (db, actions, _) = seeded();

        let thread_id = actions
            .create_thread(&db, &alice(), "Rules", "do not grief the spawn", 1)
            .unwrap();

        let thread = db.get_thread(thread_id).unwrap();
        assert_eq!(thread.body, "do not ***** the spawn");

        // Two threads at 25 XP each.
        let user = db.get_user("u-alice").unwrap();
        assert_eq!(user.total_xp, 50);
    }

    #[test]
    fn application_category_rate_limit() {
        let db = Sqlite3Database::in_memory().unwrap();
        let actions = Actions::for_tests();

        let category = site::Category { id:         0,
                                        name:       String::from("Staff apps"),
                                        kind:       site::CategoryKind::Application,
                                        staff_only: false, };
        let category_id = db.create_category(&category).unwrap();

        actions
            .create_thread(&db, &alice(), "My application", "pick me", category_id)
            .unwrap();

        let err = actions.create_thread(&db, &alice(), "Again", "pick me twice", category_id);
        assert!(matches!(err, Err(ForumErr::Forbidden(_))));

        // Someone else is unaffected.
        actions
            .create_thread(&db, &bob(), "Bob's application", "me instead", category_id)
            .unwrap();
    }

    #[test]
    fn staff_only_category_is_enforced() {
        let db = Sqlite3Database::in_memory().unwrap();
        let actions = Actions::for_tests();

        let category = site::Category { id:         0,
                                        name:       String::from("Announcements"),
                                        kind:       site::CategoryKind::Standard,
                                        staff_only: true, };
        let category_id = db.create_category(&category).unwrap();

        let err = actions.create_thread(&db, &alice(), "Hi", "hello", category_id);
        assert!(matches!(err, Err(ForumErr::Forbidden(_))));

        actions
            .create_thread(&db, &mod_user(), "Patch notes", "1.21 is live", category_id)
            .unwrap();
    }

    #[test]
    fn reply_records_resolved_mentions_only() {
        let (db, actions, thread_id) = seeded();
        db.upsert_user("u-bob", "bob", false).unwrap();

        let post_id = actions
            .create_reply(&db, &alice(), thread_id, "hey @bob and @ghost_user", None)
            .unwrap();
        assert!(post_id > 0);

        let user = db.get_user("u-alice").unwrap();
        // 25 for the seeded thread plus 10 for the reply.
        assert_eq!(user.total_xp, 35);
    }

    #[test]
    fn only_author_edits_even_staff_cannot() {
        let (db, actions, thread_id) = seeded();

        let post_id = actions
            .create_reply(&db, &alice(), thread_id, "original", None)
            .unwrap();

        let err = actions.edit_reply(&db, &bob(), post_id, "hacked");
        assert!(matches!(err, Err(ForumErr::Forbidden(_))));

        let err = actions.edit_reply(&db, &mod_user(), post_id, "moderated");
        assert!(matches!(err, Err(ForumErr::Forbidden(_))));

        actions.edit_reply(&db, &alice(), post_id, "hello").unwrap();
        let post = db.get_post(post_id).unwrap();
        assert_eq!(post.body, "hello");
        assert!(post.edited);
        assert!(post.edited_at.is_some());
    }

    #[test]
    fn delete_sentinel_depends_on_who_deletes() {
        let (db, actions, thread_id) = seeded();

        let own = actions.create_reply(&db, &alice(), thread_id, "mine", None).unwrap();
        let other = actions.create_reply(&db, &alice(), thread_id, "also mine", None).unwrap();

        let err = actions.delete_reply(&db, &bob(), own);
        assert!(matches!(err, Err(ForumErr::Forbidden(_))));

        actions.delete_reply(&db, &alice(), own).unwrap();
        assert_eq!(db.get_post(own).unwrap().deletion, site::Deletion::ByAuthor);

        actions.delete_reply(&db, &mod_user(), other).unwrap();
        assert_eq!(db.get_post(other).unwrap().deletion, site::Deletion::ByStaff);
    }

    #[test]
    fn fresh_upvote_awards_the_post_author() {
        let (db, actions, thread_id) = seeded();

        let post_id = actions
            .create_reply(&db, &alice(), thread_id, "upvote me", None)
            .unwrap();
        let alice_xp_before = db.get_user("u-alice").unwrap().total_xp;

        let score = actions
            .react(&db, &bob(), post_id, site::ReactionKind::Upvote)
            .unwrap();
        assert_eq!(score, 1);

        let alice_after = db.get_user("u-alice").unwrap();
        assert_eq!(alice_after.total_xp, alice_xp_before + 3);

        // Bob's own XP is untouched by reacting.
        assert_eq!(db.get_user("u-bob").unwrap().total_xp, 0);

        // Toggle off, then downvote, then switch back to upvote: none
        // of these is a fresh upvote, so no further award lands.
        actions.react(&db, &bob(), post_id, site::ReactionKind::Upvote).unwrap();
        actions.react(&db, &bob(), post_id, site::ReactionKind::Downvote).unwrap();
        let score = actions
            .react(&db, &bob(), post_id, site::ReactionKind::Upvote)
            .unwrap();
        assert_eq!(score, 1);

        let alice_final = db.get_user("u-alice").unwrap();
        assert_eq!(alice_final.total_xp, alice_xp_before + 3);
    }
}
