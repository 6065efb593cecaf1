/// One tick of the host's execution clock.
///
/// Passed by value to `engine_frame`; its layout is part of the engine ABI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(C)]
pub struct Frame {
    pub id: u64,
}

impl Frame {
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}
