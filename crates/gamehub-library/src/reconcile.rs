//! Merge a fresh scan with the existing catalog

use crate::title::{Title, TitleId};
use std::collections::{HashMap, HashSet};

/// Build the new catalog from `scanned`, carrying user state over from `current`.
///
/// For a title already in the catalog, favorite, hidden, playtime, last
/// played and recorded stats come from the existing entry, as does a
/// resolved or missing cover. Install path and launch reference always come
/// from the scan. Titles missing from the scan are dropped. If the scan
/// holds the same identity twice, the first occurrence wins.
pub fn reconcile(scanned: Vec<Title>, current: &[Title]) -> Vec<Title> {
    let existing: HashMap<TitleId, &Title> = current.iter().map(|t| (t.id(), t)).collect();
    let mut seen = HashSet::new();

    scanned
        .into_iter()
        .filter(|title| seen.insert(title.id()))
        .map(|mut title| {
            if let Some(old) = existing.get(&title.id()) {
                carry_forward(&mut title, old);
            }
            title
        })
        .collect()
}

fn carry_forward(fresh: &mut Title, old: &Title) {
    fresh.favorite = old.favorite;
    fresh.hidden = old.hidden;
    fresh.playtime_seconds = old.playtime_seconds;
    fresh.last_played = old.last_played;

    if !old.cover.is_unset() {
        fresh.cover = old.cover.clone();
    }
    if old.stats.avg_fps.is_some() {
        fresh.stats.avg_fps = old.stats.avg_fps.clone();
    }
    if old.stats.best_ping.is_some() {
        fresh.stats.best_ping = old.stats.best_ping.clone();
    }
}

/// Identities in `old` that are absent from `new`
pub fn dropped_ids(old: &[Title], new: &[Title]) -> Vec<TitleId> {
    let kept: HashSet<TitleId> = new.iter().map(Title::id).collect();
    old.iter()
        .map(Title::id)
        .filter(|id| !kept.contains(id))
        .collect()
}
