pub mod growable;
mod slotmap;

pub use growable::GrowableCache;
pub use slotmap::SlotMap;
