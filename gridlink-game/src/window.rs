//! Windowing over the sparse remote level sequence.
//!
//! Pure integer arithmetic: which contiguous block of level numbers to show,
//! and which neighbours to warm in the cache.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Inclusive range `[start, end]` of level numbers currently materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelWindow {
    pub start: u32,
    pub end: u32,
    /// Levels exist beyond `end`.
    pub has_more: bool,
}

impl LevelWindow {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            start: 1,
            end: 0,
            has_more: false,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end < self.start
    }

    #[must_use]
    pub const fn len(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    #[must_use]
    pub const fn contains(&self, number: u32) -> bool {
        number >= self.start && number <= self.end
    }

    #[must_use]
    pub const fn numbers(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }
}

/// Window for a player whose highest completed level is `highest_completed`.
///
/// A fresh player sees the first page; everyone else gets a page centred on
/// the level they are about to play, slid back from `max_level` so it stays
/// full whenever enough levels exist.
#[must_use]
pub fn plan_range(highest_completed: u32, max_level: u32, page_size: u32) -> LevelWindow {
    if max_level == 0 {
        return LevelWindow::empty();
    }
    let page_size = page_size.max(1);
    if highest_completed == 0 {
        let end = page_size.min(max_level);
        return LevelWindow {
            start: 1,
            end,
            has_more: end < max_level,
        };
    }
    centered(highest_completed.saturating_add(1), max_level, page_size)
}

/// Move `current` so it covers `target`, or keep it if it already does.
#[must_use]
pub fn navigate_to(
    current: &LevelWindow,
    target: u32,
    max_level: u32,
    page_size: u32,
) -> LevelWindow {
    if current.contains(target) {
        return *current;
    }
    if max_level == 0 {
        return LevelWindow::empty();
    }
    centered(target, max_level, page_size.max(1))
}

fn centered(focus: u32, max_level: u32, page_size: u32) -> LevelWindow {
    let mut start = focus.saturating_sub(page_size / 2).max(1);
    let end = start.saturating_add(page_size - 1).min(max_level);
    if end == max_level {
        start = end.saturating_sub(page_size - 1).max(1);
    }
    LevelWindow {
        start,
        end,
        has_more: end < max_level,
    }
}

/// Level numbers around `anchor` worth warming in the cache, in fetch order:
/// the anchor, then `forward` levels ahead, then `backward` levels behind.
#[must_use]
pub fn preload_targets(anchor: u32, max_level: u32, forward: u32, backward: u32) -> Vec<u32> {
    if max_level == 0 {
        return Vec::new();
    }
    let anchor = anchor.clamp(1, max_level);
    let ahead = (1..=forward).map_while(|step| anchor.checked_add(step));
    let behind = (1..=backward).map_while(|step| anchor.checked_sub(step));
    std::iter::once(anchor)
        .chain(ahead)
        .chain(behind)
        .filter(|n| (1..=max_level).contains(n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_player_sees_first_page() {
        assert_eq!(
            plan_range(0, 100, 20),
            LevelWindow {
                start: 1,
                end: 20,
                has_more: true
            }
        );
        assert_eq!(
            plan_range(0, 7, 20),
            LevelWindow {
                start: 1,
                end: 7,
                has_more: false
            }
        );
    }

    #[test]
    fn window_near_the_end_stays_full() {
        let window = plan_range(95, 100, 20);
        assert_eq!(window.end, 100);
        assert_eq!(window.len(), 20);
        assert_eq!(window.start, 81);
        assert!(!window.has_more);
    }

    #[test]
    fn window_centres_on_next_level() {
        let window = plan_range(40, 100, 20);
        assert_eq!(window.start, 31);
        assert_eq!(window.end, 50);
        assert!(window.contains(41));
        assert!(window.has_more);
    }

    #[test]
    fn small_catalogue_caps_window() {
        let window = plan_range(3, 5, 20);
        assert_eq!((window.start, window.end), (1, 5));
        assert!(!window.has_more);
    }

    #[test]
    fn empty_catalogue_yields_empty_window() {
        let window = plan_range(3, 0, 20);
        assert!(window.is_empty());
        assert_eq!(window.len(), 0);
        assert_eq!(window.numbers().count(), 0);
    }

    #[test]
    fn completed_everything_still_shows_last_page() {
        let window = plan_range(100, 100, 20);
        assert_eq!((window.start, window.end), (81, 100));
    }

    #[test]
    fn navigate_keeps_window_when_target_visible() {
        let window = plan_range(0, 100, 20);
        assert_eq!(navigate_to(&window, 12, 100, 20), window);
    }

    #[test]
    fn navigate_recentres_on_target() {
        let window = plan_range(0, 100, 20);
        let moved = navigate_to(&window, 60, 100, 20);
        assert_eq!((moved.start, moved.end), (50, 69));
        assert!(moved.has_more);
        let last = navigate_to(&moved, 99, 100, 20);
        assert_eq!((last.start, last.end), (81, 100));
    }

    #[test]
    fn preload_targets_clamp_to_catalogue() {
        assert_eq!(preload_targets(10, 100, 3, 2), vec![10, 11, 12, 13, 9, 8]);
        assert_eq!(preload_targets(1, 100, 3, 2), vec![1, 2, 3, 4]);
        assert_eq!(preload_targets(99, 100, 3, 2), vec![99, 100, 98, 97]);
        assert!(preload_targets(5, 0, 3, 2).is_empty());
    }
}
