mod classify;
mod memory;
mod serialize;

pub use classify::{class_pointer, looks_like_object, ISA_MAGIC_MASK, ISA_MAGIC_VALUE, ISA_MASK};
pub use memory::{LocalMemory, MemoryReader};
pub use serialize::{ObjectSerializer, StructuralValue, CYCLE_MARKER, MAX_DEPTH_MARKER};
