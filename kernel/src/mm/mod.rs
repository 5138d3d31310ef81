pub mod heap;

pub use heap::{AllocatorGate, HeapBackend, LinkedListHeap};
