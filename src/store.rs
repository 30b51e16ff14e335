//! Module store and name index, owned by [`crate::world::World`] and
//! protected by its module mutex.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::module::ModuleData;

/// A name key ordered by length first, then lexicographic byte order —
/// the comparison the ordered map uses when locating or inserting an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NameKey(Vec<u8>);

impl Ord for NameKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for NameKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Owns every loaded module and the name-to-module lookup.
///
/// Modules are shared via `Arc`; a module's lifetime is however long any
/// holder — the store itself, a task's module map, or a caller's handle —
/// keeps its `Arc` alive. That `Arc` strong count is this crate's refcount,
/// replacing a hand-maintained counter behind the module mutex.
#[derive(Debug, Default)]
pub struct ModuleStore {
    modules: Vec<Arc<ModuleData>>,
    names: BTreeMap<NameKey, Option<Arc<ModuleData>>>,
    next_id: u32,
}

impl ModuleStore {
    pub fn new() -> ModuleStore {
        ModuleStore {
            modules: Vec::new(),
            names: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Assigns the next module id and appends the module `build` produces,
    /// unless `build` fails — in which case the id is still consumed (ids
    /// are a monotonic seed, not a dense sequence) but nothing is inserted.
    pub fn insert(
        &mut self,
        build: impl FnOnce(u32) -> crate::error::Status<ModuleData>,
    ) -> crate::error::Status<Arc<ModuleData>> {
        let id = self.next_id;
        self.next_id += 1;
        let module = Arc::new(build(id)?);
        self.modules.push(Arc::clone(&module));
        Ok(module)
    }

    /// Binds `name` to `module`. If the name already has an entry, that
    /// entry's module pointer is overwritten (an explicit re-bind, not an
    /// automatic one — callers decide whether to overwrite). If not,
    /// a new cell is inserted at the ordered position.
    pub fn bind_name(&mut self, name: &[u8], module: Arc<ModuleData>) {
        self.names.insert(NameKey(name.to_vec()), Some(module));
    }

    /// Looks up a module by exact name, ignoring entries whose cell exists
    /// but carries no module yet.
    pub fn find_by_name(&self, name: &[u8]) -> Option<Arc<ModuleData>> {
        self.names.get(&NameKey(name.to_vec())).and_then(|m| m.clone())
    }

    pub fn find_by_id(&self, id: u32) -> Option<Arc<ModuleData>> {
        self.modules.iter().find(|m| m.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModuleData>> {
        self.modules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ProcRecord;

    fn empty_module(id: u32) -> crate::error::Status<ModuleData> {
        Ok(ModuleData {
            id,
            name_block: 0,
            proc_table: vec![ProcRecord::default()],
            reg_sizes: vec![],
            data_block_table: vec![0],
            target_table: vec![],
            insn_table: vec![],
            const128: vec![],
            const64: vec![],
            const32: vec![],
            data: vec![],
        })
    }

    #[test]
    fn assigns_increasing_ids() {
        let mut store = ModuleStore::new();
        let a = store.insert(empty_module).unwrap();
        let b = store.insert(empty_module).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn name_lookup_roundtrips() {
        let mut store = ModuleStore::new();
        let m = store.insert(empty_module).unwrap();
        store.bind_name(b"core", Arc::clone(&m));
        assert!(Arc::ptr_eq(&store.find_by_name(b"core").unwrap(), &m));
        assert!(store.find_by_name(b"missing").is_none());
    }

    #[test]
    fn name_ordering_is_length_then_lexicographic() {
        let mut keys = vec![
            NameKey(b"zz".to_vec()),
            NameKey(b"a".to_vec()),
            NameKey(b"aaa".to_vec()),
            NameKey(b"ab".to_vec()),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                NameKey(b"a".to_vec()),
                NameKey(b"ab".to_vec()),
                NameKey(b"zz".to_vec()),
                NameKey(b"aaa".to_vec()),
            ]
        );
    }
}
