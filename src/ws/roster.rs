use indexmap::IndexMap;

use super::registry::ConnectionRegistry;
use crate::models::RosterUser;

/// Distinct users present in a folder, one entry per user however many
/// tabs they have open. Ordered by first join; the name on the most
/// recently joined connection wins.
pub fn roster_for(registry: &dyn ConnectionRegistry, folder_id: &str) -> Vec<RosterUser> {
    let mut users: IndexMap<String, RosterUser> = IndexMap::new();
    for conn in registry.list_by_folder(folder_id) {
        users
            .entry(conn.user_id.clone())
            .and_modify(|u| u.user_name = conn.user_name.clone())
            .or_insert_with(|| RosterUser {
                user_id: conn.user_id.clone(),
                user_name: conn.user_name.clone(),
                is_online: true,
            });
    }
    users.into_values().collect()
}

/// Every non-empty room with its roster.
pub fn rooms(registry: &dyn ConnectionRegistry) -> Vec<(String, Vec<RosterUser>)> {
    registry
        .folders()
        .into_iter()
        .map(|folder| {
            let roster = roster_for(registry, &folder);
            (folder, roster)
        })
        .filter(|(_, roster)| !roster.is_empty())
        .collect()
}
