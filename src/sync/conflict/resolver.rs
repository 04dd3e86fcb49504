//! Entity merges built from the field policies

use super::policy::{
    earliest_wins, latest_wins, max_wins, min_wins, or_wins, remote_is_newer, union_by_id,
};
use super::Merged;
use crate::types::{DailyLog, GameState, Profile, ShieldState, StreakState, TrackedWalk};

/// Combines a freshly fetched remote copy with the current local copy
pub struct MergeResolver;

impl MergeResolver {
    /// Streak: the moment of the last met goal gates the current run
    pub fn merge_streak(local: &StreakState, remote: &StreakState) -> Merged<StreakState> {
        let adopt_remote = remote_is_newer(
            &local.last_goal_met_date,
            (local.current_streak, local.streak_start_date),
            &remote.last_goal_met_date,
            (remote.current_streak, remote.streak_start_date),
        );
        let gated = if adopt_remote { remote } else { local };

        let merged = StreakState {
            current_streak: gated.current_streak,
            last_goal_met_date: gated.last_goal_met_date,
            streak_start_date: gated.streak_start_date,
            longest_streak: max_wins(local.longest_streak, remote.longest_streak),
            consecutive_goal_days: max_wins(local.consecutive_goal_days, remote.consecutive_goal_days),
        };
        Merged::compare(local, merged)
    }

    /// Shields: balance goes down, lifetime counters go up
    pub fn merge_shields(local: &ShieldState, remote: &ShieldState) -> Merged<ShieldState> {
        let merged = ShieldState {
            available_shields: min_wins(local.available_shields, remote.available_shields),
            purchased_shields: max_wins(local.purchased_shields, remote.purchased_shields),
            shields_used_this_month: max_wins(
                local.shields_used_this_month,
                remote.shields_used_this_month,
            ),
            total_shields_used: max_wins(local.total_shields_used, remote.total_shields_used),
            last_refill_date: latest_wins(local.last_refill_date, remote.last_refill_date),
        };
        Merged::compare(local, merged)
    }

    /// Profile: a fresh install inherits the remote profile wholesale
    pub fn merge_profile(local: &Profile, remote: &Profile) -> Merged<Profile> {
        if local.is_fresh_install() {
            return Merged::compare(local, remote.clone());
        }

        let display_name = if local.display_name.is_empty() {
            remote.display_name.clone()
        } else {
            local.display_name.clone()
        };

        let merged = Profile {
            has_completed_onboarding: or_wins(
                local.has_completed_onboarding,
                remote.has_completed_onboarding,
            ),
            has_seen_first_walk_education: or_wins(
                local.has_seen_first_walk_education,
                remote.has_seen_first_walk_education,
            ),
            display_name,
            created_at: earliest_wins(local.created_at, remote.created_at),
            badges: union_by_id(&local.badges, &remote.badges, |badge| badge.id.clone()),
        };
        Merged::compare(local, merged)
    }

    /// Game state: the three sub-documents merge independently
    pub fn merge_game_state(local: &GameState, remote: &GameState) -> Merged<GameState> {
        let streak = Self::merge_streak(&local.streak, &remote.streak);
        let shields = Self::merge_shields(&local.shields, &remote.shields);
        let profile = Self::merge_profile(&local.profile, &remote.profile);

        Merged {
            changed: streak.changed || shields.changed || profile.changed,
            value: GameState {
                streak: streak.value,
                shields: shields.value,
                profile: profile.value,
            },
        }
    }

    /// Daily log: two devices writing the same day merge, never overwrite
    pub fn merge_daily_log(local: Option<&DailyLog>, remote: &DailyLog) -> Merged<DailyLog> {
        let Some(local) = local else {
            return Merged::inserted(remote.clone());
        };

        let merged = DailyLog {
            day: local.day.clone(),
            steps: max_wins(local.steps, remote.steps),
            goal_met: or_wins(local.goal_met, remote.goal_met),
            shield_used: or_wins(local.shield_used, remote.shield_used),
            tracked_walk_ids: union_by_id(&local.tracked_walk_ids, &remote.tracked_walk_ids, |id| *id),
        };
        Merged::compare(local, merged)
    }

    /// Tracked walk: insert if absent, otherwise the local copy is kept untouched
    pub fn merge_walk(local: Option<&TrackedWalk>, remote: &TrackedWalk) -> Merged<TrackedWalk> {
        match local {
            Some(existing) => Merged::unchanged(existing.clone()),
            None => Merged::inserted(remote.clone()),
        }
    }
}
