use anyhow::{Result, anyhow};

use crate::logic::{AccountMode, PlayStrategy, SimulationPlan, SimulationSummary};

pub struct CatalogEntry {
    pub key: &'static str,
    pub aliases: &'static [&'static str],
    pub name: &'static str,
    pub plan: SimulationPlan,
}

const fn entry(
    key: &'static str,
    aliases: &'static [&'static str],
    name: &'static str,
    plan: SimulationPlan,
) -> CatalogEntry {
    CatalogEntry {
        key,
        aliases,
        name,
        plan,
    }
}

pub fn catalog_scenarios() -> Vec<CatalogEntry> {
    vec![
        entry(
            "smoke",
            &[],
            "Smoke Test",
            SimulationPlan::new(PlayStrategy::Perfect).with_expectation(smoke_expectation),
        ),
        entry(
            "lives-gate",
            &["lives"],
            "Lives Gate",
            SimulationPlan::new(PlayStrategy::Perfect).with_expectation(lives_gate_expectation),
        ),
        entry(
            "lives-regen",
            &["regen"],
            "Lives Regeneration",
            SimulationPlan::new(PlayStrategy::Perfect)
                .with_sessions(2, 25)
                .with_expectation(lives_regen_expectation),
        ),
        entry(
            "rewarded-ads",
            &["ads"],
            "Rewarded Ad Refill",
            SimulationPlan::new(PlayStrategy::AdWatcher)
                .with_attempts(15)
                .with_expectation(rewarded_ads_expectation),
        ),
        entry(
            "premium",
            &[],
            "Premium Bypass",
            SimulationPlan::new(PlayStrategy::Perfect)
                .premium()
                .with_attempts(15)
                .with_expectation(premium_expectation),
        ),
        entry(
            "sloppy-play",
            &["sloppy"],
            "Sloppy Play",
            SimulationPlan::new(PlayStrategy::Sloppy)
                .with_sessions(3, 60)
                .with_expectation(sloppy_expectation),
        ),
        entry(
            "cache-expiry",
            &["cache"],
            "Cache Expiry",
            SimulationPlan::new(PlayStrategy::Perfect)
                .with_sessions(2, 25 * 60)
                .with_expectation(cache_expiry_expectation),
        ),
        entry(
            "cloud-sync",
            &["sync"],
            "Cloud Sync Across Devices",
            SimulationPlan::new(PlayStrategy::Sloppy)
                .with_accounts(AccountMode::SecondDevice)
                .with_sessions(3, 60)
                .with_expectation(cloud_sync_expectation),
        ),
        entry(
            "offline",
            &["offline-store"],
            "Offline Level Store",
            SimulationPlan::new(PlayStrategy::Perfect)
                .with_sessions(2, 30)
                .offline_from(1)
                .with_expectation(offline_expectation),
        ),
        entry(
            "window",
            &["window-planning"],
            "Level Window Planning",
            SimulationPlan::new(PlayStrategy::Perfect)
                .premium()
                .with_levels(30)
                .with_attempts(25)
                .with_expectation(window_expectation),
        ),
    ]
}

fn smoke_expectation(summary: &SimulationSummary) -> Result<()> {
    anyhow::ensure!(summary.completions() > 0, "should complete at least one level");
    anyhow::ensure!(
        usize::try_from(summary.highest_completed)? == summary.completed_count,
        "levels are played in order, so highest {} should equal count {}",
        summary.highest_completed,
        summary.completed_count
    );
    anyhow::ensure!(
        summary.final_window.contains(summary.highest_completed + 1),
        "window {:?} should cover the next level",
        summary.final_window
    );
    Ok(())
}

fn lives_gate_expectation(summary: &SimulationSummary) -> Result<()> {
    let session = summary
        .sessions
        .first()
        .ok_or_else(|| anyhow!("no session recorded"))?;
    anyhow::ensure!(
        session.attempts == summary.config.max_lives,
        "expected {} attempts before the gate, saw {}",
        summary.config.max_lives,
        session.attempts
    );
    anyhow::ensure!(session.blocked_by_lives, "lives gate never closed");
    anyhow::ensure!(summary.final_lives.current_lives == 0, "lives should be spent");
    Ok(())
}

fn lives_regen_expectation(summary: &SimulationSummary) -> Result<()> {
    let second = summary
        .sessions
        .get(1)
        .ok_or_else(|| anyhow!("second session missing"))?;
    let interval_minutes = summary.config.regen_interval_ms / 60_000;
    let expected = u32::try_from(25 / interval_minutes.max(1))?.min(summary.config.max_lives);
    anyhow::ensure!(
        second.startup.lives.current_lives == expected,
        "expected {expected} regenerated lives, found {}",
        second.startup.lives.current_lives
    );
    anyhow::ensure!(
        second.attempts == expected,
        "expected {expected} attempts in the second session, saw {}",
        second.attempts
    );
    Ok(())
}

fn rewarded_ads_expectation(summary: &SimulationSummary) -> Result<()> {
    anyhow::ensure!(summary.ads_watched > 0, "no ad was watched");
    anyhow::ensure!(
        summary.attempts > summary.config.max_lives,
        "ads should allow more than {} attempts, saw {}",
        summary.config.max_lives,
        summary.attempts
    );
    Ok(())
}

fn premium_expectation(summary: &SimulationSummary) -> Result<()> {
    anyhow::ensure!(summary.completions() == 15, "premium run should finish every attempt");
    anyhow::ensure!(
        summary.final_lives.current_lives == summary.config.max_lives,
        "premium entries must not consume lives"
    );
    anyhow::ensure!(
        summary.sessions.iter().all(|s| !s.blocked_by_lives),
        "premium player was blocked"
    );
    Ok(())
}

fn sloppy_expectation(summary: &SimulationSummary) -> Result<()> {
    anyhow::ensure!(
        summary.failed_traces + summary.completions() == summary.attempts,
        "every attempt should end solved or failed"
    );
    anyhow::ensure!(
        usize::try_from(summary.highest_completed)? == summary.completed_count,
        "failed traces must not record completions"
    );
    Ok(())
}

fn cache_expiry_expectation(summary: &SimulationSummary) -> Result<()> {
    let second = summary
        .sessions
        .get(1)
        .ok_or_else(|| anyhow!("second session missing"))?;
    anyhow::ensure!(
        second.startup.expired_entries > 0,
        "entries older than the TTL should be swept at startup"
    );
    anyhow::ensure!(
        second.window_levels > 0,
        "expired levels should be refetched"
    );
    Ok(())
}

fn cloud_sync_expectation(summary: &SimulationSummary) -> Result<()> {
    let cloud = summary
        .cloud
        .as_ref()
        .ok_or_else(|| anyhow!("no cloud record written"))?;
    anyhow::ensure!(
        cloud.highest_completed_level_number() == summary.highest_completed,
        "cloud highest {} differs from local {}",
        cloud.highest_completed_level_number(),
        summary.highest_completed
    );
    anyhow::ensure!(
        summary.second_device_completed == Some(summary.completed_count),
        "second device pulled {:?} levels, expected {}",
        summary.second_device_completed,
        summary.completed_count
    );
    Ok(())
}

fn offline_expectation(summary: &SimulationSummary) -> Result<()> {
    let second = summary
        .sessions
        .get(1)
        .ok_or_else(|| anyhow!("second session missing"))?;
    anyhow::ensure!(
        second.window_levels > 0,
        "cached levels should still render offline"
    );
    anyhow::ensure!(
        second.completions > 0,
        "cached levels should stay playable offline"
    );
    anyhow::ensure!(
        second.attempts <= second.startup.lives.current_lives,
        "failed fetches must not cost lives"
    );
    Ok(())
}

fn window_expectation(summary: &SimulationSummary) -> Result<()> {
    let window = summary.final_window;
    let expected_len = summary.config.page_size.min(summary.level_count);
    anyhow::ensure!(
        window.len() == expected_len,
        "window {window:?} should hold {expected_len} levels"
    );
    anyhow::ensure!(
        window.contains(summary.highest_completed + 1),
        "window {window:?} should cover level {}",
        summary.highest_completed + 1
    );
    if window.end == summary.level_count {
        anyhow::ensure!(!window.has_more, "window at the end cannot have more");
    }
    Ok(())
}
