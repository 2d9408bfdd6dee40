//! Heuristic: does a raw word point at a native-runtime object?
//!
//! Loosely follows the approach of testing whether an arbitrary pointer is a
//! valid object: read the first word as the class (isa) pointer, strip the
//! non-pointer isa tag bits when present, and require the class pointer to be
//! readable. Pointers that happen to mimic the tag pattern can be
//! misclassified; callers treat the answer as a hint.

use super::MemoryReader;

/// Bits of a non-pointer isa holding the class address.
pub const ISA_MASK: u64 = 0x0000_000f_ffff_fff8;
/// Bits identifying a non-pointer isa.
pub const ISA_MAGIC_MASK: u64 = 0x0000_03f0_0000_0001;
/// Expected value of `isa & ISA_MAGIC_MASK` for a non-pointer isa.
pub const ISA_MAGIC_VALUE: u64 = 0x0000_01a0_0000_0001;

/// Recover the class pointer of the object at `pointer`, if it looks like one.
pub fn class_pointer<M: MemoryReader + ?Sized>(memory: &M, pointer: u64) -> Option<u64> {
    if !memory.is_readable(pointer) {
        return None;
    }
    let isa = memory.read_pointer(pointer)?;
    let class = if isa & ISA_MAGIC_MASK == ISA_MAGIC_VALUE {
        isa & ISA_MASK
    } else {
        isa
    };
    memory.is_readable(class).then_some(class)
}

pub fn looks_like_object<M: MemoryReader + ?Sized>(memory: &M, pointer: u64) -> bool {
    class_pointer(memory, pointer).is_some()
}
