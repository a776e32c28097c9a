use tracing::{info, warn};

use crate::badges::BadgeNotifier;
use crate::db;
use crate::util;
use crate::util::ForumErr;

/// Everything a user can earn XP for. All five weights are part of the
/// contract even where no current caller fires them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XpAction {
    Thread,
    Reply,
    Edit,
    ReactionReceived,
    PostReaction,
}

impl XpAction {
    pub fn from_str(s: &str) -> Option<XpAction> {
        match s {
            "thread" => Some(XpAction::Thread),
            "reply" => Some(XpAction::Reply),
            "edit" => Some(XpAction::Edit),
            "reaction_received" => Some(XpAction::ReactionReceived),
            "post_reaction" => Some(XpAction::PostReaction),
            _ => None,
        }
    }

    pub fn base_weight(&self) -> u64 {
        match self {
            XpAction::Thread => 25,
            XpAction::Reply => 10,
            XpAction::Edit => 5,
            XpAction::ReactionReceived => 3,
            XpAction::PostReaction => 2,
        }
    }
}

/// Reputation-weighted award, rounded to the nearest whole XP per
/// award rather than accumulated fractionally.
pub fn weighted_amount(action: XpAction, reputation: i64) -> u64 {
    let multiplier = if reputation > 0 {
        1.25
    } else if reputation < 0 {
        0.75
    } else {
        1.0
    };

    (action.base_weight() as f64 * multiplier).round() as u64
}

/// Level is always a pure function of total XP, never stored
/// independently of a recompute.
pub fn level_for(total_xp: u64) -> u32 {
    (0.1 * (total_xp as f64).sqrt()).floor() as u32
}

/// Award XP for a named action. Unrecognized actions are a logged
/// no-op. The increment itself happens inside the store; the level is
/// recomputed from the returned total, so two concurrent awards to one
/// user cannot clobber each other.
pub fn award<DB: db::Database>(
    database: &DB,
    badges: &BadgeNotifier,
    uuid: &str,
    action: &str,
) -> Result<(), ForumErr> {
    let action = match XpAction::from_str(action) {
        Some(action) => action,
        None => {
            warn!(action, uuid, "ignoring unknown xp action");
            return Ok(());
        },
    };

    let user = database.get_user(uuid)?;
    let amount = weighted_amount(action, user.reputation);

    let (new_total, stored_level) = database.apply_xp_delta(uuid, amount, util::timestamp())?;

    let new_level = level_for(new_total);
    if new_level != stored_level {
        database.set_level(uuid, new_level)?;
    }

    if new_level > stored_level {
        info!(uuid, level = new_level, "user levelled up");
    }

    // Badge evaluation is a collaborator; its failure never rolls the
    // award back.
    badges.notify(uuid, new_level);

    Ok(())
}
