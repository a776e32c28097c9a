use std::path::PathBuf;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::db;
use crate::site;
use crate::util::ForumErr;

pub struct Sqlite3Database {
    pool: Pool<SqliteConnectionManager>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS Users (
        Uuid        TEXT     PRIMARY KEY,
        Username    TEXT     NOT NULL,
        IsStaff     INTEGER  NOT NULL DEFAULT 0,
        TotalXp     INTEGER  NOT NULL DEFAULT 0,
        Level       INTEGER  NOT NULL DEFAULT 0,
        XpThisWeek  INTEGER  NOT NULL DEFAULT 0,
        Reputation  INTEGER  NOT NULL DEFAULT 0,
        LastXpGain  INTEGER
    );

    CREATE TABLE IF NOT EXISTS Categories (
        CategoryId  INTEGER  PRIMARY KEY,
        Name        TEXT     NOT NULL,
        Kind        TEXT     NOT NULL DEFAULT 'standard',
        StaffOnly   INTEGER  NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS Threads (
        ThreadId    INTEGER  PRIMARY KEY,
        AuthorUuid  TEXT     NOT NULL,
        Title       TEXT     NOT NULL,
        Body        TEXT     NOT NULL,
        CategoryId  INTEGER  NOT NULL,
        Sticky      INTEGER  NOT NULL DEFAULT 0,
        Private     INTEGER  NOT NULL DEFAULT 0,
        Deletion    INTEGER  NOT NULL DEFAULT 0,
        Time        INTEGER  NOT NULL
    );

    CREATE TABLE IF NOT EXISTS Posts (
        PostId      INTEGER  PRIMARY KEY,
        ThreadId    INTEGER  NOT NULL,
        AuthorUuid  TEXT     NOT NULL,
        ParentId    INTEGER          ,
        Body        TEXT     NOT NULL,
        Deletion    INTEGER  NOT NULL DEFAULT 0,
        Edited      INTEGER  NOT NULL DEFAULT 0,
        EditedAt    INTEGER          ,
        Time        INTEGER  NOT NULL
    );

    CREATE INDEX IF NOT EXISTS PostsByThread ON Posts (ThreadId, Time);

    CREATE TABLE IF NOT EXISTS Reactions (
        PostId      INTEGER  NOT NULL,
        UserUuid    TEXT     NOT NULL,
        Kind        TEXT     NOT NULL,
        Time        INTEGER  NOT NULL,
        PRIMARY KEY(PostId, UserUuid)
    );

    CREATE TABLE IF NOT EXISTS Mentions (
        PostKind       TEXT     NOT NULL,
        PostId         INTEGER  NOT NULL,
        MentionedUuid  TEXT     NOT NULL,
        Time           INTEGER  NOT NULL
    );
"#;

impl Sqlite3Database {
    pub fn from_path(path: PathBuf) -> Result<Self, ForumErr> {
        let manager = SqliteConnectionManager::file(&path);
        let pool = r2d2::Pool::new(manager)?;

        let conn = pool.get()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Sqlite3Database { pool })
    }

    /// In-memory database on a single-connection pool; each pooled
    /// connection would otherwise see its own private memory store.
    pub fn in_memory() -> Result<Self, ForumErr> {
        let manager = SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder().max_size(1).build(manager)?;

        let conn = pool.get()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Sqlite3Database { pool })
    }
}

fn deletion_to_int(deletion: site::Deletion) -> u8 {
    match deletion {
        site::Deletion::Live => 0,
        site::Deletion::ByAuthor => 1,
        site::Deletion::ByStaff => 2,
    }
}

fn int_to_deletion(val: u8) -> site::Deletion {
    match val {
        1 => site::Deletion::ByAuthor,
        2 => site::Deletion::ByStaff,
        _ => site::Deletion::Live,
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<site::User> {
    Ok(site::User { uuid:         row.get(0)?,
                    username:     row.get(1)?,
                    is_staff:     row.get(2)?,
                    total_xp:     row.get(3)?,
                    level:        row.get(4)?,
                    xp_this_week: row.get(5)?,
                    reputation:   row.get(6)?,
                    last_xp_gain: row.get(7)?, })
}

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<site::Category> {
    let kind = match row.get::<usize, String>(2)?.as_str() {
        "application" => site::CategoryKind::Application,
        _ => site::CategoryKind::Standard,
    };

    Ok(site::Category { id:         row.get(0)?,
                        name:       row.get(1)?,
                        kind,
                        staff_only: row.get(3)?, })
}

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<site::Thread> {
    Ok(site::Thread { id:          row.get(0)?,
                      author_uuid: row.get(1)?,
                      title:       row.get(2)?,
                      body:        row.get(3)?,
                      category_id: row.get(4)?,
                      sticky:      row.get(5)?,
                      private:     row.get(6)?,
                      deletion:    int_to_deletion(row.get(7)?),
                      created_at:  row.get(8)?, })
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<site::Post> {
    Ok(site::Post { id:          row.get(0)?,
                    thread_id:   row.get(1)?,
                    author_uuid: row.get(2)?,
                    parent_id:   row.get(3)?,
                    body:        row.get(4)?,
                    deletion:    int_to_deletion(row.get(5)?),
                    edited:      row.get(6)?,
                    edited_at:   row.get(7)?,
                    created_at:  row.get(8)?, })
}

const POST_COLS: &str = "PostId, ThreadId, AuthorUuid, ParentId, Body, Deletion, Edited, EditedAt, Time";

fn users_by_column(
    pool: &Pool<SqliteConnectionManager>,
    column: &str,
    keys: &[String],
) -> Result<Vec<site::User>, ForumErr> {
    if keys.is_empty() {
        return Ok(vec![]);
    }

    let conn = pool.get()?;
    let placeholders = (1..=keys.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<String>>()
        .join(", ");

    let sql = format!(
        r#"
        SELECT Uuid, Username, IsStaff, TotalXp, Level, XpThisWeek, Reputation, LastXpGain
            FROM Users WHERE {} IN ({});
    "#,
        column, placeholders
    );

    let mut query = conn.prepare(&sql)?;
    let user_iter = query.query_map(rusqlite::params_from_iter(keys.iter()), row_to_user)?;

    let mut users = vec![];
    for user in user_iter {
        users.push(user?);
    }

    Ok(users)
}

impl db::Database for Sqlite3Database {
    fn upsert_user(&self, uuid: &str, username: &str, is_staff: bool) -> Result<(), ForumErr> {
        let conn = self.pool.get()?;
        conn.execute(
            r#"
            INSERT INTO Users (Uuid, Username, IsStaff) VALUES (?1, ?2, ?3)
                ON CONFLICT(Uuid) DO UPDATE
                SET Username = excluded.Username, IsStaff = excluded.IsStaff;
        "#,
            (uuid, username, is_staff),
        )?;
        Ok(())
    }

    fn get_user(&self, uuid: &str) -> Result<site::User, ForumErr> {
        let conn = self.pool.get()?;
        let mut query = conn.prepare(
            r#"
            SELECT Uuid, Username, IsStaff, TotalXp, Level, XpThisWeek, Reputation, LastXpGain
                FROM Users WHERE Uuid = ?1;
        "#,
        )?;

        query.query_row((uuid,), row_to_user).map_err(|e| e.into())
    }

    fn get_users_by_names(&self, names: &[String]) -> Result<Vec<site::User>, ForumErr> {
        users_by_column(&self.pool, "Username", names)
    }

    fn get_users_by_uuids(&self, uuids: &[String]) -> Result<Vec<site::User>, ForumErr> {
        users_by_column(&self.pool, "Uuid", uuids)
    }

    fn apply_xp_delta(&self, uuid: &str, delta: u64, now: u64) -> Result<(u64, u32), ForumErr> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        // The delta lands in the store as an increment; the caller
        // never read-modifies-writes the counter in application code.
        let updated = tx.execute(
            r#"
            UPDATE Users
                SET TotalXp = TotalXp + ?2, XpThisWeek = XpThisWeek + ?2, LastXpGain = ?3
                WHERE Uuid = ?1;
        "#,
            (uuid, delta, now),
        )?;

        if updated == 0 {
            return Err(ForumErr::not_found(format!("no such user {}", uuid)));
        }

        let (total, level) = tx.query_row(
            "SELECT TotalXp, Level FROM Users WHERE Uuid = ?1;",
            (uuid,),
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        tx.commit()?;
        Ok((total, level))
    }

    fn set_level(&self, uuid: &str, level: u32) -> Result<(), ForumErr> {
        let conn = self.pool.get()?;
        conn.execute("UPDATE Users SET Level = ?2 WHERE Uuid = ?1;", (uuid, level))?;
        Ok(())
    }

    fn set_reputation(&self, uuid: &str, reputation: i64) -> Result<(), ForumErr> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE Users SET Reputation = ?2 WHERE Uuid = ?1;",
            (uuid, reputation),
        )?;
        Ok(())
    }

    fn create_category(&self, category: &site::Category) -> Result<u64, ForumErr> {
        let conn = self.pool.get()?;
        let kind = match category.kind {
            site::CategoryKind::Standard => "standard",
            site::CategoryKind::Application => "application",
        };

        conn.execute(
            r#"
            INSERT INTO Categories (Name, Kind, StaffOnly) VALUES (?1, ?2, ?3);
        "#,
            (&category.name, kind, category.staff_only),
        )?;

        Ok(conn.last_insert_rowid() as u64)
    }

    fn get_category(&self, category_id: u64) -> Result<site::Category, ForumErr> {
        let conn = self.pool.get()?;
        let mut query = conn.prepare(
            r#"
            SELECT CategoryId, Name, Kind, StaffOnly FROM Categories WHERE CategoryId = ?1;
        "#,
        )?;

        query
            .query_row((category_id,), row_to_category)
            .map_err(|e| e.into())
    }

    fn create_thread(&self, thread: &site::Thread) -> Result<u64, ForumErr> {
        let conn = self.pool.get()?;
        conn.execute(
            r#"
            INSERT INTO Threads (AuthorUuid, Title, Body, CategoryId, Sticky, Private, Deletion, Time)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7);
        "#,
            (
                &thread.author_uuid,
                &thread.title,
                &thread.body,
                thread.category_id,
                thread.sticky,
                thread.private,
                thread.created_at,
            ),
        )?;

        Ok(conn.last_insert_rowid() as u64)
    }

    fn get_thread(&self, thread_id: u64) -> Result<site::Thread, ForumErr> {
        let conn = self.pool.get()?;
        let mut query = conn.prepare(
            r#"
            SELECT ThreadId, AuthorUuid, Title, Body, CategoryId, Sticky, Private, Deletion, Time
                FROM Threads WHERE ThreadId = ?1;
        "#,
        )?;

        query
            .query_row((thread_id,), row_to_thread)
            .map_err(|e| e.into())
    }

    fn latest_thread_time(
        &self,
        author_uuid: &str,
        category_id: u64,
    ) -> Result<Option<u64>, ForumErr> {
        let conn = self.pool.get()?;
        let mut query = conn.prepare(
            r#"
            SELECT MAX(Time) FROM Threads WHERE AuthorUuid = ?1 AND CategoryId = ?2;
        "#,
        )?;

        query
            .query_row((author_uuid, category_id), |row| row.get(0))
            .map_err(|e| e.into())
    }

    fn soft_delete_thread(&self, thread_id: u64, by_staff: bool) -> Result<(), ForumErr> {
        let conn = self.pool.get()?;
        let deletion = if by_staff {
            deletion_to_int(site::Deletion::ByStaff)
        } else {
            deletion_to_int(site::Deletion::ByAuthor)
        };

        // Posts are orphaned, never cascaded; they stay navigable.
        let updated = conn.execute(
            "UPDATE Threads SET Deletion = ?2 WHERE ThreadId = ?1;",
            (thread_id, deletion),
        )?;

        if updated == 0 {
            return Err(ForumErr::not_found(format!("no such thread {}", thread_id)));
        }
        Ok(())
    }

    fn create_post(
        &self,
        thread_id: u64,
        author_uuid: &str,
        body: &str,
        parent_id: Option<u64>,
        now: u64,
    ) -> Result<u64, ForumErr> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let thread_deletion: u8 = tx
            .query_row(
                "SELECT Deletion FROM Threads WHERE ThreadId = ?1;",
                (thread_id,),
                |row| row.get(0),
            )
            .map_err(|_| ForumErr::not_found(format!("no such thread {}", thread_id)))?;

        if int_to_deletion(thread_deletion).is_deleted() {
            return Err(ForumErr::not_found(format!("thread {} is deleted", thread_id)));
        }

        // Same-transaction parent check: the parent must exist and
        // belong to this thread, so callers cannot insert a reply
        // pointing across threads.
        if let Some(parent) = parent_id {
            let parent_thread: u64 = tx
                .query_row(
                    "SELECT ThreadId FROM Posts WHERE PostId = ?1;",
                    (parent,),
                    |row| row.get(0),
                )
                .map_err(|_| ForumErr::not_found(format!("no such parent post {}", parent)))?;

            if parent_thread != thread_id {
                return Err(ForumErr::validation(format!(
                    "parent post {} is not in thread {}",
                    parent, thread_id
                )));
            }
        }

        tx.execute(
            r#"
            INSERT INTO Posts (ThreadId, AuthorUuid, ParentId, Body, Deletion, Edited, Time)
                VALUES (?1, ?2, ?3, ?4, 0, 0, ?5);
        "#,
            (thread_id, author_uuid, parent_id, body, now),
        )?;

        let post_id = tx.last_insert_rowid() as u64;
        tx.commit()?;
        Ok(post_id)
    }

    fn get_post(&self, post_id: u64) -> Result<site::Post, ForumErr> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM Posts WHERE PostId = ?1;", POST_COLS);
        let mut query = conn.prepare(&sql)?;

        query.query_row((post_id,), row_to_post).map_err(|e| e.into())
    }

    fn get_thread_posts(&self, thread_id: u64) -> Result<Vec<site::Post>, ForumErr> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM Posts WHERE ThreadId = ?1 ORDER BY Time ASC, PostId ASC;",
            POST_COLS
        );
        let mut query = conn.prepare(&sql)?;

        let post_iter = query.query_map((thread_id,), row_to_post)?;

        let mut posts = vec![];
        for post in post_iter {
            posts.push(post?);
        }

        Ok(posts)
    }

    fn top_level_replies(
        &self,
        thread_id: u64,
        page: u64,
        limit: u64,
    ) -> Result<db::ReplyPage, ForumErr> {
        let conn = self.pool.get()?;

        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM Posts WHERE ThreadId = ?1 AND ParentId IS NULL;",
            (thread_id,),
            |row| row.get(0),
        )?;

        let offset = page.saturating_sub(1).saturating_mul(limit);
        let sql = format!(
            r#"
            SELECT {} FROM Posts
                WHERE ThreadId = ?1 AND ParentId IS NULL
                ORDER BY Time ASC, PostId ASC
                LIMIT ?2 OFFSET ?3;
        "#,
            POST_COLS
        );
        let mut query = conn.prepare(&sql)?;

        let post_iter = query.query_map((thread_id, limit, offset), row_to_post)?;

        let mut posts = vec![];
        for post in post_iter {
            posts.push(post?);
        }

        Ok(db::ReplyPage { posts, total })
    }

    fn update_post_body(&self, post_id: u64, body: &str, now: u64) -> Result<(), ForumErr> {
        let conn = self.pool.get()?;

        // Time is left alone so sibling ordering stays stable; the
        // edit is visible through Edited/EditedAt.
        let updated = conn.execute(
            r#"
            UPDATE Posts SET Body = ?2, Edited = 1, EditedAt = ?3 WHERE PostId = ?1;
        "#,
            (post_id, body, now),
        )?;

        if updated == 0 {
            return Err(ForumErr::not_found(format!("no such post {}", post_id)));
        }
        Ok(())
    }

    fn soft_delete_post(&self, post_id: u64, by_staff: bool) -> Result<(), ForumErr> {
        let conn = self.pool.get()?;
        let deletion = if by_staff {
            deletion_to_int(site::Deletion::ByStaff)
        } else {
            deletion_to_int(site::Deletion::ByAuthor)
        };

        let updated = conn.execute(
            "UPDATE Posts SET Deletion = ?2 WHERE PostId = ?1;",
            (post_id, deletion),
        )?;

        if updated == 0 {
            return Err(ForumErr::not_found(format!("no such post {}", post_id)));
        }
        Ok(())
    }

    fn react(
        &self,
        post_id: u64,
        user_uuid: &str,
        kind: site::ReactionKind,
        now: u64,
    ) -> Result<site::ReactOutcome, ForumErr> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT Kind FROM Reactions WHERE PostId = ?1 AND UserUuid = ?2;",
                (post_id, user_uuid),
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                err => Err(err),
            })?;

        let outcome = match existing.as_deref().and_then(site::ReactionKind::from_str) {
            None => {
                tx.execute(
                    r#"
                    INSERT INTO Reactions (PostId, UserUuid, Kind, Time) VALUES (?1, ?2, ?3, ?4);
                "#,
                    (post_id, user_uuid, kind.as_str(), now),
                )?;
                site::ReactOutcome::Added(kind)
            },
            Some(prev) if prev == kind => {
                tx.execute(
                    "DELETE FROM Reactions WHERE PostId = ?1 AND UserUuid = ?2;",
                    (post_id, user_uuid),
                )?;
                site::ReactOutcome::Removed(kind)
            },
            Some(_) => {
                tx.execute(
                    r#"
                    UPDATE Reactions SET Kind = ?3, Time = ?4 WHERE PostId = ?1 AND UserUuid = ?2;
                "#,
                    (post_id, user_uuid, kind.as_str(), now),
                )?;
                site::ReactOutcome::Switched(kind)
            },
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn score(&self, post_id: u64) -> Result<i64, ForumErr> {
        let conn = self.pool.get()?;
        conn.query_row(
            r#"
            SELECT COALESCE(SUM(CASE Kind WHEN 'upvote' THEN 1 ELSE -1 END), 0)
                FROM Reactions WHERE PostId = ?1;
        "#,
            (post_id,),
            |row| row.get(0),
        )
        .map_err(|e| e.into())
    }

    fn record_mentions(
        &self,
        kind: site::MentionKind,
        post_id: u64,
        uuids: &[String],
        now: u64,
    ) -> Result<(), ForumErr> {
        if uuids.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        for uuid in uuids {
            tx.execute(
                r#"
                INSERT INTO Mentions (PostKind, PostId, MentionedUuid, Time)
                    VALUES (?1, ?2, ?3, ?4);
            "#,
                (kind.as_str(), post_id, uuid, now),
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}
