/// A hardware port delivering PDM data 32 bits at a time.
///
/// Each word holds bits in arrival order, oldest bit in the LSB. With two microphones on a
/// double data rate port the bits alternate between them: even bits belong to channel 0, odd
/// bits to channel 1, and one pair of consecutive words carries 32 samples of each.
pub trait PdmPort {
    /// Read the word that triggered the port-ready event
    fn read(&mut self) -> u32;

    /// Arm the port-ready event. Called once, after setup has succeeded.
    fn enable_interrupt(&mut self) {}
}

impl<P: PdmPort + ?Sized> PdmPort for &mut P {
    fn read(&mut self) -> u32 {
        (**self).read()
    }

    fn enable_interrupt(&mut self) {
        (**self).enable_interrupt()
    }
}

/// A port fed from an iterator of words, for driving the pipeline off-target.
/// Once the source runs dry it reads as an idle (all zero) data line.
pub struct SimulatedPort<I> {
    source: I,
    reads: usize,
    armed: bool,
}

impl<I> SimulatedPort<I>
where I: Iterator<Item = u32>
{
    pub fn new(source: I) -> Self {
        Self { source, reads: 0, armed: false }
    }

    /// Number of words read so far
    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl<I> PdmPort for SimulatedPort<I>
where I: Iterator<Item = u32>
{
    fn read(&mut self) -> u32 {
        self.reads += 1;
        self.source.next().unwrap_or(0)
    }

    fn enable_interrupt(&mut self) {
        self.armed = true;
    }
}
