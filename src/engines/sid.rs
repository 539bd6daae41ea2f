//! SID register vocabulary.

use bitflags::bitflags;

bitflags! {
    /// Voice control register bits as stored in wave programs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Waveform: u8 {
        const GATE = 0x01;
        const SYNC = 0x02;
        const RING = 0x04;
        const TEST = 0x08;
        const TRIANGLE = 0x10;
        const SAWTOOTH = 0x20;
        const PULSE = 0x40;
        const NOISE = 0x80;
    }
}

impl Waveform {
    /// Oscillator selection bits.
    pub const SHAPES: Waveform = Waveform::TRIANGLE
        .union(Waveform::SAWTOOTH)
        .union(Waveform::PULSE)
        .union(Waveform::NOISE);

    /// Default instrument waveforms, cycled across padding slots.
    pub const DEFAULT_CYCLE: [Waveform; 4] = [
        Waveform::TRIANGLE,
        Waveform::SAWTOOTH,
        Waveform::PULSE,
        Waveform::NOISE,
    ];

    /// Whether a control byte selects a waveform the chip can play.
    ///
    /// Noise combined with any other shape locks the oscillator, so it is
    /// rejected. A bare gate/test byte with no shape is accepted only with
    /// the test bit set (hard restart).
    pub fn is_plausible(byte: u8) -> bool {
        let wf = Waveform::from_bits_retain(byte);
        let shapes = wf & Waveform::SHAPES;
        if shapes.is_empty() {
            return wf.contains(Waveform::TEST) || byte == 0;
        }
        !(shapes.contains(Waveform::NOISE) && shapes != Waveform::NOISE)
    }
}
