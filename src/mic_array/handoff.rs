use core::sync::atomic::{AtomicU32, Ordering};
use heapless::spsc::{Consumer, Producer, Queue};

/// Single slot queue; a heapless spsc queue of size N holds N - 1 items
type Slot<'a> = Queue<&'a mut [u32], 2>;

/// Lock-free handoff of capture buffers between the interrupt and the consumer.
///
/// Buffers move by ownership: the producer gives a filled buffer away through the `filled` slot
/// and can only refill memory that came back through the `free` slot. With two buffers in
/// circulation each slot never holds more than one of them.
///
/// Lives wherever both halves can borrow it for as long as the pipeline runs; on a target that is
/// usually a `static`, which `new` being const allows.
pub struct Handoff<'a> {
    filled: Slot<'a>,
    free: Slot<'a>,
    overruns: AtomicU32,
}

impl<'a> Handoff<'a> {
    pub const fn new() -> Self {
        Self {
            filled: Queue::new(),
            free: Queue::new(),
            overruns: AtomicU32::new(0),
        }
    }

    /// Split into the interrupt side and the consumer side
    pub fn split(&mut self) -> (BufferPublisher<'_, 'a>, BufferReceiver<'_, 'a>) {
        let Self { filled, free, overruns } = self;
        let overruns: &AtomicU32 = overruns;
        let (filled_tx, filled_rx) = filled.split();
        let (free_tx, free_rx) = free.split();
        (
            BufferPublisher { filled: filled_tx, free: free_rx, overruns },
            BufferReceiver { filled: filled_rx, free: free_tx, overruns },
        )
    }
}

impl<'a> Default for Handoff<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer end, owned by the interrupt handler
pub struct BufferPublisher<'q, 'a> {
    filled: Producer<'q, &'a mut [u32], 2>,
    free: Consumer<'q, &'a mut [u32], 2>,
    overruns: &'q AtomicU32,
}

impl<'q, 'a> BufferPublisher<'q, 'a> {
    /// Hand a filled buffer to the consumer. Gives the buffer back if the slot is still occupied.
    pub fn publish(&mut self, block: &'a mut [u32]) -> Result<(), &'a mut [u32]> {
        self.filled.enqueue(block)
    }

    /// Take back a buffer the consumer has finished with, if there is one
    pub fn reclaim(&mut self) -> Option<&'a mut [u32]> {
        self.free.dequeue()
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

/// Consumer end, owned by the pipeline controller
pub struct BufferReceiver<'q, 'a> {
    filled: Consumer<'q, &'a mut [u32], 2>,
    free: Producer<'q, &'a mut [u32], 2>,
    overruns: &'q AtomicU32,
}

impl<'q, 'a> BufferReceiver<'q, 'a> {
    /// Take the most recently published buffer, if there is one
    pub fn receive(&mut self) -> Option<&'a mut [u32]> {
        self.filled.dequeue()
    }

    /// Return a buffer so the producer can fill it again
    pub fn release(&mut self, block: &'a mut [u32]) -> Result<(), &'a mut [u32]> {
        self.free.enqueue(block)
    }

    /// Number of buffers the producer had to drop because no free buffer was available
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}
