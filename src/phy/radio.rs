//! The transceiver interface.

/// Frequency of RF channel 0, in MHz.
pub const BASE_FREQ_MHZ: u16 = 2402;

/// Delay between the start of a receive and the end of a detected sync word, in 100 ns units.
///
/// Made of the radio warm-up time and the 32 µs of sync word on air. Subtracted from the sync
/// detection time to get the arrival time of the packet.
pub const EXPECTED_RX_OFFSET: i32 = 610;

/// Trait for the 2.4 GHz transceiver used by the baseband.
///
/// The radio is expected to behave like a CC2400: a frequency synthesizer that has to be locked
/// before receiving or transmitting, a 32-byte TX FIFO, and a receive path whose demodulated bits
/// are copied to memory by DMA.
///
/// The baseband works in air bit order: bit 0 of byte 0 is on air first. Implementations convert
/// from and to the bit order of the hardware.
pub trait Radio {
    /// Programs the synthesizer for `mhz`, for a transmission if `tx` is set.
    fn tune(&mut self, mhz: u16, tx: bool);

    /// Turns the synthesizer on.
    fn fs_on(&mut self);

    /// Configures the receive path.
    ///
    /// `max_ac_errors` is the number of sync word bit errors still reported as a sync.
    fn configure_rx(&mut self, max_ac_errors: u8);

    /// Configures the transmit path (FIFO mode, no preamble insertion beyond the hardware's).
    fn configure_tx(&mut self);

    /// Starts receiving.
    fn start_rx(&mut self);

    /// Starts transmitting the FIFO contents.
    fn start_tx(&mut self);

    /// Returns the radio to idle, aborting any reception or transmission.
    fn idle(&mut self);

    /// Returns whether the radio is in its receive state.
    fn is_receiving(&self) -> bool;

    /// Returns whether the synthesizer is locked and ready to transmit.
    fn fs_locked(&self) -> bool;

    /// Returns whether a started transmission has completed.
    fn tx_done(&self) -> bool;

    /// Returns whether the sync word was detected in the current reception.
    fn sync_detected(&self) -> bool;

    /// Sets the 32 sync word bits the receiver correlates against (hardware bit order).
    fn set_sync(&mut self, sync: u32);

    /// Sets the crystal frequency offset trim.
    fn set_freq_offset(&mut self, offset: u8);

    /// Pushes `data` into the TX FIFO.
    fn fifo_write(&mut self, data: &[u8]);

    /// Enables the interrupt raised when the TX FIFO drains below its threshold.
    ///
    /// The interrupt handler must call [`Controller::fifo_irq`].
    ///
    /// [`Controller::fifo_irq`]: ../ctl/struct.Controller.html#method.fifo_irq
    fn enable_fifo_irq(&mut self);

    /// Disables the TX FIFO interrupt.
    fn disable_fifo_irq(&mut self);

    /// Starts copying received bits to memory.
    fn rx_dma_start(&mut self);

    /// Copies the bytes received since the last call into `dst`, returning their number.
    ///
    /// Bytes are delivered in the bit order of the hardware: the baseband reverses each of them.
    /// At most `dst.len()` bytes are copied.
    fn rx_dma_read(&mut self, dst: &mut [u8]) -> usize;

    /// Stops the receive DMA.
    fn rx_dma_stop(&mut self);
}
