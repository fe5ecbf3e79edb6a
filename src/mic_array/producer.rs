use core::cell::RefCell;
use core::mem;
use critical_section::Mutex;
use log::{error, warn};

use crate::handoff::BufferPublisher;
use crate::port::PdmPort;

/// Interrupt side of the pipeline: fills one capture buffer while the consumer drains the other.
///
/// Words are written at descending indices, so a full buffer holds its newest word at index 0.
/// When the active buffer fills it is published and the buffer the consumer gave back becomes
/// active. If the consumer has not given one back yet the current buffer is simply filled
/// again; that block of audio is lost and counted as an overrun, but memory the consumer owns is
/// never written.
pub struct PdmProducer<'q, 'a, P> {
    port: P,
    active: &'a mut [u32],
    spare: Option<&'a mut [u32]>,
    countdown: usize,
    publisher: BufferPublisher<'q, 'a>,
    published: u32,
}

impl<'q, 'a, P> PdmProducer<'q, 'a, P>
where P: PdmPort
{
    pub(crate) fn new(
        port: P,
        first: &'a mut [u32],
        second: &'a mut [u32],
        publisher: BufferPublisher<'q, 'a>,
    ) -> Self {
        debug_assert!(!first.is_empty() && first.len() == second.len());
        let countdown = first.len() - 1;
        Self { port, active: first, spare: Some(second), countdown, publisher, published: 0 }
    }

    /// Enable the port-ready event
    pub fn arm(&mut self) {
        self.port.enable_interrupt();
    }

    /// Interrupt body: read one word and store it, swapping buffers once a block is complete
    pub fn on_port_ready(&mut self) {
        let word = self.port.read();
        self.active[self.countdown] = word;
        if self.countdown > 0 {
            self.countdown -= 1;
        } else {
            self.countdown = self.active.len() - 1;
            self.swap();
        }
    }

    fn swap(&mut self) {
        let next = match self.spare.take().or_else(|| self.publisher.reclaim()) {
            Some(next) => next,
            None => {
                self.publisher.record_overrun();
                warn!("PDM overrun, consumer still holds the idle buffer");
                return;
            }
        };
        let full = mem::replace(&mut self.active, next);
        match self.publisher.publish(full) {
            Ok(()) => self.published = self.published.wrapping_add(1),
            Err(full) => {
                // Only two buffers circulate, so the slot can't be occupied while we hold both
                error!("PDM handoff slot occupied");
                self.publisher.record_overrun();
                self.spare = Some(full);
            }
        }
    }

    /// Number of buffers handed to the consumer
    pub fn published(&self) -> u32 {
        self.published
    }

    pub fn overruns(&self) -> u32 {
        self.publisher.overruns()
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

/// Somewhere to keep the producer so an interrupt handler can reach it, e.g.
///
/// ```ignore
/// static PDM: IsrSlot<'static, 'static, MyPort> = IsrSlot::new();
///
/// #[interrupt]
/// fn PORT_READY() {
///     PDM.on_interrupt();
/// }
/// ```
pub struct IsrSlot<'q, 'a, P> {
    inner: Mutex<RefCell<Option<PdmProducer<'q, 'a, P>>>>,
}

impl<'q, 'a, P> IsrSlot<'q, 'a, P>
where P: PdmPort
{
    pub const fn new() -> Self {
        Self { inner: Mutex::new(RefCell::new(None)) }
    }

    /// Store the producer and arm its port. Both happen inside one critical section so the first
    /// event can't fire before the producer is in place.
    pub fn install(&self, mut producer: PdmProducer<'q, 'a, P>) {
        critical_section::with(|cs| {
            producer.arm();
            self.inner.borrow(cs).replace(Some(producer));
        });
    }

    /// Call from the port-ready interrupt handler. Does nothing until a producer is installed.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| {
            if let Some(producer) = self.inner.borrow(cs).borrow_mut().as_mut() {
                producer.on_port_ready();
            }
        });
    }

    /// Run `f` against the installed producer
    pub fn with<R>(&self, f: impl FnOnce(&mut PdmProducer<'q, 'a, P>) -> R) -> Option<R> {
        critical_section::with(|cs| self.inner.borrow(cs).borrow_mut().as_mut().map(f))
    }

    pub fn take(&self) -> Option<PdmProducer<'q, 'a, P>> {
        critical_section::with(|cs| self.inner.borrow(cs).take())
    }
}

impl<'q, 'a, P> Default for IsrSlot<'q, 'a, P>
where P: PdmPort
{
    fn default() -> Self {
        Self::new()
    }
}
