//! Heap access with preemption held off.
//!
//! The general-purpose allocator is not reentrant. Instead of masking
//! interrupts for the whole call, the scheduler is suspended: ticks still
//! arrive, but no other task can run until the allocator is done.

use core::alloc::Layout;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use linked_list_allocator::Heap;
use spin::Mutex;

use crate::sched::PreemptionControl;

/// `malloc`/`free`-style allocator underneath the gate.
pub trait HeapBackend {
    /// `None` when the heap is exhausted.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// # Safety
    /// `block` must come from `allocate` on the same backend and not have
    /// been released yet.
    unsafe fn release(&self, block: NonNull<u8>);
}

impl<T: HeapBackend + ?Sized> HeapBackend for &T {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate(size)
    }

    unsafe fn release(&self, block: NonNull<u8>) {
        (**self).release(block)
    }
}

/// Serializes heap calls against task switches.
pub struct AllocatorGate<B, P> {
    backend: B,
    preemption: P,
}

impl<B: HeapBackend, P: PreemptionControl> AllocatorGate<B, P> {
    pub const fn new(backend: B, preemption: P) -> Self {
        Self { backend, preemption }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Allocates `wanted` bytes. Exhaustion is passed through as `None`.
    pub fn malloc(&self, wanted: u16) -> Option<NonNull<u8>> {
        self.preemption.suspend_all();
        let block = self.backend.allocate(wanted as usize);
        self.preemption.resume_all();
        block
    }

    /// Returns a block to the heap. `None` is ignored.
    ///
    /// # Safety
    /// A `Some` block must have come from [`AllocatorGate::malloc`] on this
    /// gate and not been freed already.
    pub unsafe fn free(&self, block: Option<NonNull<u8>>) {
        let Some(block) = block else {
            return;
        };
        self.preemption.suspend_all();
        self.backend.release(block);
        self.preemption.resume_all();
    }
}

const HEADER: usize = size_of::<usize>();
const HEADER_ALIGN: usize = align_of::<usize>();

/// First-fit heap over a fixed arena.
///
/// Each block carries a one-word size header so `release` needs only the
/// pointer, like C `free`.
pub struct LinkedListHeap {
    heap: Mutex<Heap>,
}

impl LinkedListHeap {
    pub const fn empty() -> Self {
        Self { heap: Mutex::new(Heap::empty()) }
    }

    /// # Safety
    /// `start..start + size` must be valid, writable, unused memory that
    /// outlives the heap. Call once.
    pub unsafe fn init(&self, start: *mut u8, size: usize) {
        crate::kprintln!("heap: init start={:p} size={}", start, size);
        self.heap.lock().init(start, size);
    }

    pub fn free_bytes(&self) -> usize {
        self.heap.lock().free()
    }
}

impl HeapBackend for LinkedListHeap {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let total = size.checked_add(HEADER)?;
        let layout = Layout::from_size_align(total, HEADER_ALIGN).ok()?;
        let block = self.heap.lock().allocate_first_fit(layout).ok()?;
        unsafe {
            block.as_ptr().cast::<usize>().write(total);
            Some(NonNull::new_unchecked(block.as_ptr().add(HEADER)))
        }
    }

    unsafe fn release(&self, block: NonNull<u8>) {
        let start = block.as_ptr().sub(HEADER);
        let total = start.cast::<usize>().read();
        let layout = Layout::from_size_align_unchecked(total, HEADER_ALIGN);
        self.heap.lock().deallocate(NonNull::new_unchecked(start), layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};

    use crate::arch::pic18::sim::Pic18Core;
    use crate::config::{AddressTier, PortConfig};
    use crate::sched::{Port, SchedulerHooks};
    use crate::task::stack::TaskStack;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Suspend,
        Resume,
        Allocate,
        Release,
        Tick,
        SelectNext,
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct MockPreemption {
        suspended: Rc<Cell<bool>>,
        log: Log,
    }

    impl PreemptionControl for MockPreemption {
        fn suspend_all(&self) {
            self.suspended.set(true);
            self.log.borrow_mut().push(Event::Suspend);
        }

        fn resume_all(&self) {
            self.suspended.set(false);
            self.log.borrow_mut().push(Event::Resume);
        }
    }

    struct CountingBackend {
        calls: Cell<u32>,
    }

    impl HeapBackend for CountingBackend {
        fn allocate(&self, _size: usize) -> Option<NonNull<u8>> {
            self.calls.set(self.calls.get() + 1);
            None
        }

        unsafe fn release(&self, _block: NonNull<u8>) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    struct LoggingScheduler {
        stacks: Vec<TaskStack>,
        current: usize,
        suspended: Rc<Cell<bool>>,
        log: Log,
    }

    impl SchedulerHooks for LoggingScheduler {
        fn current_stack(&mut self) -> &mut TaskStack {
            &mut self.stacks[self.current]
        }

        fn switch_context(&mut self) {
            self.log.borrow_mut().push(Event::SelectNext);
            self.current = (self.current + 1) % self.stacks.len();
        }

        fn increment_tick(&mut self) -> bool {
            self.log.borrow_mut().push(Event::Tick);
            !self.suspended.get()
        }
    }

    struct Rig {
        port: Port<Pic18Core>,
        sched: LoggingScheduler,
    }

    impl Rig {
        fn fire_tick(&mut self, at: u32) {
            let Rig { port, sched } = self;
            port.hardware_mut().pc = at;
            if port.hardware_mut().raise_tick() {
                port.tick(sched);
            }
        }
    }

    /// Backend whose allocation gets interrupted by the tick.
    struct TickingBackend {
        rig: Rc<RefCell<Rig>>,
        log: Log,
    }

    impl HeapBackend for TickingBackend {
        fn allocate(&self, _size: usize) -> Option<NonNull<u8>> {
            self.log.borrow_mut().push(Event::Allocate);
            self.rig.borrow_mut().fire_tick(0x0822);
            Some(NonNull::dangling())
        }

        unsafe fn release(&self, _block: NonNull<u8>) {
            self.log.borrow_mut().push(Event::Release);
        }
    }

    fn quiet_preemption() -> MockPreemption {
        MockPreemption { suspended: Rc::new(Cell::new(false)), log: Rc::new(RefCell::new(Vec::new())) }
    }

    #[test]
    fn test_malloc_free_on_linked_list_heap() {
        let mut arena = vec![0usize; 256];
        let heap = LinkedListHeap::empty();
        unsafe { heap.init(arena.as_mut_ptr().cast(), arena.len() * HEADER) };
        let initial = heap.free_bytes();

        let preemption = quiet_preemption();
        let log = preemption.log.clone();
        let gate = AllocatorGate::new(&heap, preemption);

        let a = gate.malloc(40).unwrap();
        let b = gate.malloc(12).unwrap();
        assert_ne!(a, b);
        assert!(heap.free_bytes() < initial);

        unsafe {
            a.as_ptr().write_bytes(0xA5, 40);
            gate.free(Some(a));
            gate.free(Some(b));
        }
        assert_eq!(heap.free_bytes(), initial);
        assert_eq!(
            *log.borrow(),
            [Event::Suspend, Event::Resume].repeat(4)
        );
    }

    #[test]
    fn test_exhaustion_is_passed_through() {
        let mut arena = vec![0usize; 64];
        let heap = LinkedListHeap::empty();
        unsafe { heap.init(arena.as_mut_ptr().cast(), arena.len() * HEADER) };

        let preemption = quiet_preemption();
        let suspended = preemption.suspended.clone();
        let gate = AllocatorGate::new(&heap, preemption);

        assert_eq!(gate.malloc(u16::MAX), None);
        assert!(!suspended.get());
    }

    #[test]
    fn test_free_none_never_reaches_the_allocator() {
        let preemption = quiet_preemption();
        let log = preemption.log.clone();
        let gate = AllocatorGate::new(CountingBackend { calls: Cell::new(0) }, preemption);

        unsafe { gate.free(None) };

        assert_eq!(gate.backend().calls.get(), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_tick_during_malloc_does_not_switch() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let suspended = Rc::new(Cell::new(false));

        let cfg = PortConfig::new(AddressTier::Small, 2);
        let mut port = Port::new(Pic18Core::new(&cfg), cfg);
        let stacks = [(0x0800u16, 1u16), (0x0900, 2)]
            .iter()
            .map(|&(entry, param)| {
                let mut stack = TaskStack::for_config(&cfg, 32).unwrap();
                port.initialise_stack(&mut stack, entry, param);
                stack
            })
            .collect();
        let mut sched = LoggingScheduler { stacks, current: 0, suspended: suspended.clone(), log: log.clone() };
        port.start_scheduler(&mut sched).unwrap();

        let rig = Rc::new(RefCell::new(Rig { port, sched }));
        let gate = AllocatorGate::new(
            TickingBackend { rig: rig.clone(), log: log.clone() },
            MockPreemption { suspended, log: log.clone() },
        );

        assert!(gate.malloc(16).is_some());
        assert_eq!(rig.borrow().sched.current, 0);
        assert_eq!(rig.borrow().port.hardware().pc, 0x0822);

        // Outside the gate the next tick switches as usual.
        rig.borrow_mut().fire_tick(0x0830);
        assert_eq!(rig.borrow().sched.current, 1);

        let events = log.borrow();
        let suspend = events.iter().position(|e| *e == Event::Suspend).unwrap();
        let resume = events.iter().position(|e| *e == Event::Resume).unwrap();
        assert!(suspend < resume);
        assert!(events[suspend..resume].contains(&Event::Tick));
        assert!(!events[suspend..resume].contains(&Event::SelectNext));
        assert_eq!(
            events.as_slice(),
            &[
                Event::Suspend,
                Event::Allocate,
                Event::Tick,
                Event::Resume,
                Event::Tick,
                Event::SelectNext,
            ]
        );
    }
}
