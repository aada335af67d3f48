use crate::value::{TAG_MAP, TAG_NUMBER, TAG_STRING, TAG_USERDATA};
use crate::{UserData, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Script tables are string-keyed; a BTreeMap gives `next` a stable order.
pub type Map = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
pub struct Arena<T> {
    pub data: Vec<T>,
    pub free_indices: Vec<u32>,
    /// One flag per slot, kept in step with `free_indices`.
    free_mask: Vec<bool>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            free_indices: Vec::new(),
            free_mask: Vec::new(),
        }
    }

    fn alloc(&mut self, item: T) -> u32 {
        if let Some(idx) = self.free_indices.pop() {
            self.data[idx as usize] = item;
            self.free_mask[idx as usize] = false;
            idx
        } else {
            let index = self.data.len() as u32;
            self.data.push(item);
            self.free_mask.push(false);
            index
        }
    }

    /// Puts a slot on the free list. Releasing a free slot is a no-op.
    fn release(&mut self, index: u32) {
        if let Some(flag) = self.free_mask.get_mut(index as usize) {
            if !*flag {
                *flag = true;
                self.free_indices.push(index);
            }
        }
    }

    pub fn is_free(&self, index: u32) -> bool {
        self.free_mask.get(index as usize).copied().unwrap_or(false)
    }

    pub fn live(&self) -> usize {
        self.data.len() - self.free_indices.len()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a sweep released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub strings: usize,
    pub numbers: usize,
    pub maps: usize,
    pub userdata: usize,
    /// Owned userdata whose native destructor ran during this sweep.
    pub destroyed: usize,
}

pub struct Heap {
    // Typed Arenas
    pub strings: Arena<String>,
    pub numbers: Arena<f64>,
    pub maps: Arena<Map>,
    pub userdata: Arena<Option<UserData>>,

    // Mark State (One set per arena type)
    pub marked_strings: HashSet<u32>,
    pub marked_numbers: HashSet<u32>,
    pub marked_maps: HashSet<u32>,
    pub marked_userdata: HashSet<u32>,

    // GC Metrics
    pub bytes_allocated: usize,
    pub next_gc_threshold: usize,
    reclaimed: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            strings: Arena::new(),
            numbers: Arena::new(),
            maps: Arena::new(),
            userdata: Arena::new(),

            marked_strings: HashSet::new(),
            marked_numbers: HashSet::new(),
            marked_maps: HashSet::new(),
            marked_userdata: HashSet::new(),

            bytes_allocated: 0,
            next_gc_threshold: 1024 * 1024, // Start at 1MB
            reclaimed: 0,
        }
    }

    pub fn alloc_string(&mut self, s: String) -> u32 {
        self.bytes_allocated += s.capacity();
        self.strings.alloc(s)
    }

    pub fn alloc_number(&mut self, n: f64) -> u32 {
        self.bytes_allocated += std::mem::size_of::<f64>();
        self.numbers.alloc(n)
    }

    pub fn alloc_map(&mut self, m: Map) -> u32 {
        self.bytes_allocated += m.len() * std::mem::size_of::<(String, Value)>();
        self.maps.alloc(m)
    }

    pub fn alloc_userdata(&mut self, ud: UserData) -> u32 {
        self.bytes_allocated += std::mem::size_of::<UserData>();
        self.userdata.alloc(Some(ud))
    }

    pub fn get_string(&self, index: u32) -> Option<&String> {
        self.strings.data.get(index as usize)
    }

    pub fn get_number(&self, index: u32) -> Option<f64> {
        self.numbers.data.get(index as usize).copied()
    }

    pub fn get_map(&self, index: u32) -> Option<&Map> {
        self.maps.data.get(index as usize)
    }

    pub fn get_map_mut(&mut self, index: u32) -> Option<&mut Map> {
        self.maps.data.get_mut(index as usize)
    }

    pub fn get_userdata(&self, index: u32) -> Option<&UserData> {
        self.userdata.data.get(index as usize).and_then(Option::as_ref)
    }

    pub fn get_userdata_mut(&mut self, index: u32) -> Option<&mut UserData> {
        self.userdata.data.get_mut(index as usize).and_then(Option::as_mut)
    }

    // Tracing (Mark Phase) logic
    pub fn trace(&mut self, roots: Vec<Value>) {
        let mut worklist = roots;

        while let Some(val) = worklist.pop() {
            let Some(handle) = val.as_handle() else {
                continue;
            };

            match val.tag() {
                TAG_STRING => {
                    self.marked_strings.insert(handle);
                }
                TAG_NUMBER => {
                    self.marked_numbers.insert(handle);
                }
                TAG_USERDATA => {
                    // Userdata holds native state only, no VM children.
                    self.marked_userdata.insert(handle);
                }
                TAG_MAP => {
                    // Keys are owned Rust strings, only values need tracing.
                    if self.marked_maps.insert(handle) {
                        if let Some(m) = self.maps.data.get(handle as usize) {
                            worklist.extend(m.values().copied());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    pub fn sweep(&mut self) -> SweepStats {
        let mut stats = SweepStats::default();

        // Strings
        for i in 0..self.strings.data.len() {
            let idx = i as u32;
            if !self.marked_strings.contains(&idx) && !self.strings.is_free(idx) {
                self.strings.release(idx);
                self.strings.data[i] = String::new(); // Free memory
                stats.strings += 1;
            }
        }
        self.marked_strings.clear();

        // Numbers
        for i in 0..self.numbers.data.len() {
            let idx = i as u32;
            if !self.marked_numbers.contains(&idx) && !self.numbers.is_free(idx) {
                self.numbers.release(idx);
                self.numbers.data[i] = 0.0;
                stats.numbers += 1;
            }
        }
        self.marked_numbers.clear();

        // Maps
        for i in 0..self.maps.data.len() {
            let idx = i as u32;
            if !self.marked_maps.contains(&idx) && !self.maps.is_free(idx) {
                self.maps.release(idx);
                self.maps.data[i] = Map::new();
                stats.maps += 1;
            }
        }
        self.marked_maps.clear();

        // Userdata: taking the slot out runs UserData::drop, which destroys
        // owned payloads and leaves borrowed referents untouched.
        for i in 0..self.userdata.data.len() {
            let idx = i as u32;
            if self.marked_userdata.contains(&idx) {
                continue;
            }
            if let Some(slot) = self.userdata.data[i].take() {
                if slot.is_owned() {
                    stats.destroyed += 1;
                }
                drop(slot);
                self.userdata.release(idx);
                stats.userdata += 1;
            }
        }
        self.marked_userdata.clear();

        self.reclaimed += stats.destroyed;
        self.bytes_allocated = self.estimate_live_bytes();

        debug!(
            strings = stats.strings,
            maps = stats.maps,
            userdata = stats.userdata,
            destroyed = stats.destroyed,
            "heap sweep finished"
        );
        stats
    }

    fn estimate_live_bytes(&self) -> usize {
        let strings: usize = self.strings.data.iter().map(String::capacity).sum();
        let maps: usize = self
            .maps
            .data
            .iter()
            .map(|m| m.len() * std::mem::size_of::<(String, Value)>())
            .sum();
        strings
            + maps
            + self.numbers.live() * std::mem::size_of::<f64>()
            + self.userdata.live() * std::mem::size_of::<UserData>()
    }

    pub fn should_collect(&self) -> bool {
        self.bytes_allocated > self.next_gc_threshold
    }

    /// Total number of owned userdata destroyed by sweeps so far.
    pub fn reclaimed_count(&self) -> usize {
        self.reclaimed
    }

    pub fn live_userdata(&self) -> usize {
        self.userdata.live()
    }

    pub fn is_string_free(&self, index: u32) -> bool {
        self.strings.is_free(index)
    }

    pub fn is_map_free(&self, index: u32) -> bool {
        self.maps.is_free(index)
    }

    pub fn is_map_marked(&self, index: u32) -> bool {
        self.marked_maps.contains(&index)
    }

    pub fn is_userdata_free(&self, index: u32) -> bool {
        self.userdata.is_free(index)
    }
}
