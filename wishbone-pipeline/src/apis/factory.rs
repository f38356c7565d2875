use super::epic::EpicStore;
use super::gog::GogStore;
use super::steam::SteamStore;
use super::Storefront;
use std::sync::Arc;

/// Build the storefront adapter registered under `source_id`.
pub fn create_storefront(source_id: &str) -> Option<Arc<dyn Storefront>> {
    match source_id {
        "steam" => Some(Arc::new(SteamStore::new())),
        "gog" => Some(Arc::new(GogStore::new())),
        "epic" => Some(Arc::new(EpicStore::new())),
        _ => None,
    }
}

/// Adapters for every enabled source id, skipping unknown ids.
pub fn create_storefronts(source_ids: &[String]) -> Vec<Arc<dyn Storefront>> {
    source_ids
        .iter()
        .filter_map(|id| create_storefront(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sources_resolve() {
        for id in ["steam", "gog", "epic"] {
            let store = create_storefront(id).unwrap();
            assert_eq!(store.platform_name(), id);
        }
    }

    #[test]
    fn unknown_sources_are_skipped() {
        assert!(create_storefront("itch").is_none());
        let stores = create_storefronts(&["steam".to_string(), "itch".to_string()]);
        assert_eq!(stores.len(), 1);
    }
}
