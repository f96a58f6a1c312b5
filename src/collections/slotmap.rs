/// Free-list backed storage that hands out stable `usize` keys.
/// Vacant slots hold the index of the next vacant slot.
#[derive(Debug)]
pub struct SlotMap<T> {
    head: u32,
    entries: Vec<Result<T, u32>>,
    occupied: usize,
}
const END: u32 = u32::MAX;
impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T> SlotMap<T> {
    pub fn new() -> Self {
        Self {
            head: END,
            entries: vec![],
            occupied: 0,
        }
    }
    pub fn len(&self) -> usize {
        self.occupied
    }
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }
    pub fn get(&self, key: usize) -> Option<&T> {
        self.entries.get(key).and_then(|r| r.as_ref().ok())
    }
    pub fn get_mut(&mut self, key: usize) -> Option<&mut T> {
        self.entries.get_mut(key).and_then(|r| r.as_mut().ok())
    }
    /// The key the next `insert` will return.
    pub fn next_key(&self) -> usize {
        if self.head == END {
            self.entries.len()
        } else {
            self.head as usize
        }
    }
    pub fn insert(&mut self, value: T) -> usize {
        self.occupied += 1;
        if self.head == END {
            self.entries.push(Ok(value));
            return self.entries.len() - 1;
        }
        let key = self.head as usize;
        match core::mem::replace(&mut self.entries[key], Ok(value)) {
            Err(next) => self.head = next,
            Ok(_) => unreachable!("free list pointed at an occupied slot"),
        }
        key
    }
    pub fn remove(&mut self, key: usize) -> Option<T> {
        let slot = self.entries.get_mut(key)?;
        if slot.is_err() {
            return None;
        }
        self.occupied -= 1;
        let value = core::mem::replace(slot, Err(self.head)).ok();
        self.head = key as u32;
        value
    }
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, v)| v.as_ref().ok().map(|v| (i, v)))
    }
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.entries.iter_mut().enumerate().filter_map(|(i, v)| v.as_mut().ok().map(|v| (i, v)))
    }
    pub fn retain(&mut self, mut keep: impl FnMut(usize, &mut T) -> bool) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if let Ok(item) = entry {
                if !keep(i, item) {
                    *entry = Err(core::mem::replace(&mut self.head, i as u32));
                    self.occupied -= 1;
                }
            }
        }
    }
}
