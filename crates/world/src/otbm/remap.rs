//! Item id translation between on-disk numbering and editor numbering.

use std::collections::{BTreeMap, HashMap};

use mapforge_core::{Item, ItemId};

/// Bidirectional id table for one OTBM version.
///
/// The table is a permutation of the id space: ids without an entry map to
/// themselves, and every insert keeps both directions inverse to each other,
/// so an editor id always has exactly one disk id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemIdMap {
    to_editor: HashMap<ItemId, ItemId>,
    to_disk: HashMap<ItemId, ItemId>,
}

impl ItemIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(disk, editor)` pairs. Later pairs win over earlier ones.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ItemId, ItemId)>) -> Self {
        let mut map = Self::new();
        for (disk, editor) in pairs {
            map.insert(disk, editor);
        }
        map
    }

    /// Map `disk` to `editor`. The disk id that used to reach `editor` takes
    /// over the editor id `disk` used to reach, closing the chain into a
    /// cycle.
    pub fn insert(&mut self, disk: ItemId, editor: ItemId) {
        let displaced_editor = self.to_editor(disk);
        if displaced_editor == editor {
            return;
        }
        let displaced_disk = self.to_disk(editor);
        self.link(disk, editor);
        self.link(displaced_disk, displaced_editor);
    }

    fn link(&mut self, disk: ItemId, editor: ItemId) {
        if disk == editor {
            self.to_editor.remove(&disk);
            self.to_disk.remove(&editor);
        } else {
            self.to_editor.insert(disk, editor);
            self.to_disk.insert(editor, disk);
        }
    }

    pub fn to_editor(&self, disk: ItemId) -> ItemId {
        self.to_editor.get(&disk).copied().unwrap_or(disk)
    }

    pub fn to_disk(&self, editor: ItemId) -> ItemId {
        self.to_disk.get(&editor).copied().unwrap_or(editor)
    }

    pub fn is_identity(&self) -> bool {
        self.to_editor.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_editor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_editor.is_empty()
    }

    /// Rewrite an item tree from disk ids to editor ids.
    pub fn item_to_editor(&self, item: &mut Item) {
        if !self.is_identity() {
            item.remap_ids(&|id| self.to_editor(id));
        }
    }
}

/// Id tables keyed by OTBM version.
#[derive(Debug, Clone, Default)]
pub struct RemapRegistry {
    tables: BTreeMap<u32, ItemIdMap>,
}

impl RemapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, version: u32, map: ItemIdMap) {
        self.tables.insert(version, map);
    }

    /// Table for `version`, if one is registered.
    pub fn table(&self, version: u32) -> Option<&ItemIdMap> {
        self.tables.get(&version).filter(|table| !table.is_identity())
    }

    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.tables.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_ids_pass_through() {
        let map = ItemIdMap::from_pairs([(100, 2000)]);
        assert_eq!(map.to_editor(100), 2000);
        assert_eq!(map.to_disk(2000), 100);
        assert_eq!(map.to_editor(7), 7);
        assert_eq!(map.to_disk(7), 7);
    }

    #[test]
    fn mapped_targets_displace_their_own_ids() {
        let map = ItemIdMap::from_pairs([(500, 100)]);
        assert_eq!(map.to_editor(500), 100);
        assert_eq!(map.to_disk(500), 100);
        assert_eq!(map.to_editor(100), 500);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn every_id_round_trips_after_overlapping_inserts() {
        let map = ItemIdMap::from_pairs([(1, 2), (2, 3), (3, 1), (7, 2), (2, 2), (9, 9)]);
        for id in 0..16 {
            assert_eq!(map.to_editor(map.to_disk(id)), id, "editor id {id}");
            assert_eq!(map.to_disk(map.to_editor(id)), id, "disk id {id}");
        }
        // Two disk ids for one editor id: the later pair wins.
        assert_eq!(map.to_disk(2), 2);
        assert_eq!(map.to_editor(9), 9);
    }

    #[test]
    fn item_tree_is_remapped() {
        let map = ItemIdMap::from_pairs([(1, 11), (2, 22)]);
        let mut bag = Item::new(1).containing(Item::new(2)).containing(Item::new(3));
        map.item_to_editor(&mut bag);
        assert_eq!(bag.id, 11);
        assert_eq!(bag.contents[0].id, 22);
        assert_eq!(bag.contents[1].id, 3);
    }

    #[test]
    fn registry_ignores_empty_tables() {
        let mut registry = RemapRegistry::new();
        registry.register(1, ItemIdMap::new());
        registry.register(2, ItemIdMap::from_pairs([(5, 6)]));
        assert!(registry.table(1).is_none());
        assert!(registry.table(2).is_some());
        assert!(registry.table(3).is_none());
        assert_eq!(registry.versions().collect::<Vec<_>>(), vec![1, 2]);
    }
}
