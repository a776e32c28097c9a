use serde::{Deserialize, Serialize};

/// Mirror of the identity the auth collaborator manages, plus the XP
/// state this crate owns. Rows are upserted from request identity on
/// every write path, so a user always exists by the time XP is awarded.
#[derive(Debug, Clone)]
pub struct User {
    pub uuid:         String,
    pub username:     String,
    pub is_staff:     bool,
    pub total_xp:     u64,
    pub level:        u32,
    pub xp_this_week: u64,
    pub reputation:   i64,
    pub last_xp_gain: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Standard,
    /// Staff-application style categories carry a per-user thread
    /// rate limit (one thread per window).
    Application,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id:         u64,
    pub name:       String,
    pub kind:       CategoryKind,
    pub staff_only: bool,
}

/// Who soft-deleted a row, which decides the redaction sentinel shown
/// at read time. The row itself is never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Live,
    ByAuthor,
    ByStaff,
}

impl Deletion {
    pub fn is_deleted(&self) -> bool {
        !matches!(self, Deletion::Live)
    }

    pub fn sentinel(&self) -> &'static str {
        match self {
            Deletion::Live => "",
            Deletion::ByAuthor => "[Deleted]",
            Deletion::ByStaff => "[Deleted by staff]",
        }
    }
}

/// The thread row doubles as the implicit root post; replies with a
/// null parent sit directly beneath it.
#[derive(Debug, Clone)]
pub struct Thread {
    pub id:          u64,
    pub author_uuid: String,
    pub title:       String,
    pub body:        String,
    pub category_id: u64,
    pub sticky:      bool,
    pub private:     bool,
    pub deletion:    Deletion,
    pub created_at:  u64,
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id:          u64,
    pub thread_id:   u64,
    pub author_uuid: String,
    pub parent_id:   Option<u64>,
    pub body:        String,
    pub deletion:    Deletion,
    pub edited:      bool,
    pub edited_at:   Option<u64>,
    pub created_at:  u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Upvote,
    Downvote,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Upvote => "upvote",
            ReactionKind::Downvote => "downvote",
        }
    }

    pub fn from_str(s: &str) -> Option<ReactionKind> {
        match s {
            "upvote" => Some(ReactionKind::Upvote),
            "downvote" => Some(ReactionKind::Downvote),
            _ => None,
        }
    }
}

/// Outcome of a react call. Only `Added(Upvote)` triggers a
/// reaction-received XP award; switching kinds does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactOutcome {
    Added(ReactionKind),
    Removed(ReactionKind),
    Switched(ReactionKind),
}

impl ReactOutcome {
    pub fn is_new_upvote(&self) -> bool {
        matches!(self, ReactOutcome::Added(ReactionKind::Upvote))
    }
}

/// Which kind of content a mention was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionKind {
    Thread,
    Reply,
}

impl MentionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MentionKind::Thread => "thread",
            MentionKind::Reply => "reply",
        }
    }
}
