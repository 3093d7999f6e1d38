//! Terminal rendering of daemon responses - ASCII only

use owo_colors::OwoColorize;
use quest_common::api::{
    ClaimOutcome, ClaimStatus, HealthResponse, LeaderboardView, ProgressView, ReviewOutcome,
    TodayQuests,
};
use quest_common::claims::{PendingClaim, PendingStatus};
use quest_common::leaderboard::LeaderboardEntry;
use quest_common::ledger::{GrantOutcome, ResetOutcome};
use std::fmt::Write;

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {}", message.red());
}

pub fn claim(outcome: &ClaimOutcome) -> String {
    let mut out = String::new();
    match outcome.status {
        ClaimStatus::Granted => {
            let _ = writeln!(
                out,
                "[OK] {} completed {} (+{} XP)",
                outcome.user_id,
                outcome.quest_key.cyan(),
                outcome.xp_reward
            );
        }
        ClaimStatus::Pending => {
            let _ = writeln!(
                out,
                "[PENDING] {} submitted {} for review (#{})",
                outcome.user_id,
                outcome.quest_key.cyan(),
                outcome.pending_id.unwrap_or_default()
            );
        }
    }
    let _ = writeln!(out, "  Quest:  {}", outcome.quest_text);
    if let Some(grant) = &outcome.grant {
        let _ = writeln!(out, "  XP:     {}", grant.new_total);
    }
    let _ = writeln!(out, "  Streak: {} day(s)", outcome.streak);
    if outcome.rank_up() {
        let _ = writeln!(out, "{}", format!("[RANK UP] now {}", outcome.rank_name).bright_green());
    } else if outcome.tier_up() {
        let _ = writeln!(out, "{}", format!("[TIER UP] {}", outcome.rank_name).green());
    }
    out
}

pub fn progress(view: &ProgressView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", view.user_id.bold());
    let _ = writeln!(
        out,
        "  Rank:   {} (tier {}/{})",
        view.rank_name.bright_green(),
        view.tier,
        view.tier_count
    );
    let _ = writeln!(out, "  XP:     {}", view.xp_total);
    match (&view.next_rank_name, view.xp_to_next_rank) {
        (Some(next), Some(remaining)) => {
            let _ = writeln!(out, "  Next:   {} in {} XP", next, remaining);
        }
        _ => {
            let _ = writeln!(out, "  Next:   highest rank reached");
        }
    }
    let _ = writeln!(out, "  Streak: {} day(s)", view.streak);
    if let Some(last) = view.last_activity_date {
        let _ = writeln!(out, "  Active: {}", last);
    }

    let open: Vec<&str> = view
        .eligible_pools
        .iter()
        .filter(|pool| !view.claimed.contains(*pool))
        .map(String::as_str)
        .collect();
    if open.is_empty() {
        let _ = writeln!(out, "  Open:   none");
    } else {
        let _ = writeln!(out, "  Open:   {}", open.join(", "));
    }
    if !view.claimed.is_empty() {
        let _ = writeln!(out, "  Done:   {}", view.claimed.join(", ").dimmed());
    }
    out
}

fn entry_line(entry: &LeaderboardEntry) -> String {
    format!(
        "{:>4}. {:<24} {:>8} XP  rank {}",
        entry.position, entry.user_id, entry.xp, entry.rank
    )
}

pub fn leaderboard(view: &LeaderboardView) -> String {
    let mut out = String::new();
    let mut title = format!("Leaderboard: {}", view.category);
    if let Some(name) = &view.rank_name {
        let _ = write!(title, " / {}", name);
    }
    if let Some(days) = view.window_days {
        let _ = write!(title, " / last {} days", days);
    }
    let _ = writeln!(out, "{}", title.bold());

    if view.board.entries.is_empty() {
        let _ = writeln!(out, "  No members yet");
    }
    for entry in &view.board.entries {
        let _ = writeln!(out, "{}", entry_line(entry));
    }

    if let Some(caller) = &view.board.caller {
        let listed = view
            .board
            .entries
            .iter()
            .any(|e| e.user_id == caller.user_id);
        if !listed {
            let _ = writeln!(out, "  ...");
            let _ = writeln!(out, "{}", entry_line(caller).yellow());
        }
    }
    let _ = writeln!(out, "  {} member(s) ranked", view.board.total);
    out
}

pub fn today(quests: &TodayQuests) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", format!("Daily quests for {}", quests.day_key).bold());
    if quests.daily.is_empty() {
        let _ = writeln!(out, "  Not posted yet");
    }
    for quest in &quests.daily {
        let _ = writeln!(
            out,
            "  {:<12} {:>4} XP  {}",
            quest.pool_key.cyan(),
            quest.xp_reward,
            quest.quest_text
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", format!("Weekly quests for {}", quests.week_key).bold());
    if quests.weekly.is_empty() {
        let _ = writeln!(out, "  Not posted yet");
    }
    for quest in &quests.weekly {
        let _ = writeln!(
            out,
            "  rank {:<7} {:>4} XP  {}",
            quest.rank,
            quest.xp_reward,
            quest.quest_text
        );
    }
    out
}

pub fn grant(outcome: &GrantOutcome) -> String {
    let mut out = format!(
        "[OK] {} {:+} XP, total {}\n",
        outcome.user_id, outcome.amount, outcome.new_total
    );
    if outcome.rank_up() {
        let _ = writeln!(
            out,
            "{}",
            format!("[RANK UP] {} -> {}", outcome.old_rank, outcome.new_rank).bright_green()
        );
    }
    out
}

pub fn reset(outcome: &ResetOutcome) -> String {
    format!(
        "[OK] {} reset (was {} XP at rank {})\n",
        outcome.user_id, outcome.previous_xp, outcome.previous_rank
    )
}

fn status_label(status: PendingStatus) -> String {
    match status {
        PendingStatus::Pending => status.as_str().yellow().to_string(),
        PendingStatus::Approved => status.as_str().green().to_string(),
        PendingStatus::Rejected => status.as_str().red().to_string(),
    }
}

pub fn pending(claims: &[PendingClaim]) -> String {
    if claims.is_empty() {
        return "No claims waiting for review\n".to_string();
    }
    let mut out = String::new();
    for claim in claims {
        let _ = writeln!(
            out,
            "#{:<5} {:<20} {:<12} {:>4} XP  {}  ({})",
            claim.id,
            claim.user_id,
            claim.quest_key,
            claim.xp_reward,
            claim.period_key,
            status_label(claim.status)
        );
        let _ = writeln!(out, "       {}", claim.quest_text.dimmed());
    }
    out
}

pub fn review(outcome: &ReviewOutcome) -> String {
    let claim = &outcome.claim;
    let mut out = format!(
        "[OK] claim #{} by {} {}\n",
        claim.id,
        claim.user_id,
        status_label(claim.status)
    );
    if let Some(grant) = &outcome.grant {
        out.push_str(&self::grant(grant));
    }
    out
}

pub fn health(health: &HealthResponse) -> String {
    let mut out = String::new();
    if health.ledger_drift == 0 {
        let _ = writeln!(out, "[OK] questd {} ({})", health.version, health.status.green());
    } else {
        let _ = writeln!(out, "[WARNING] questd {} ({})", health.version, health.status.yellow());
        let _ = writeln!(
            out,
            "  Ledger:   {} member(s) out of sync with their XP events",
            health.ledger_drift
        );
    }
    let _ = writeln!(out, "  Schema:   v{}", health.schema_version);
    let _ = writeln!(out, "  Day:      {}", health.day_key);
    let _ = writeln!(out, "  Week:     {}", health.week_key);
    let _ = writeln!(
        out,
        "  Approval: {}",
        if health.require_approval { "required" } else { "off" }
    );
    out
}
