//! MOS 6502 vocabulary used to tell player code from player data.
//!
//! The converter never executes 6502 code. It only needs a handful of
//! opcodes: the ones that are overwhelmingly common in code and rare in
//! well-formed tables, and the `LDA #imm` / `STA abs` pair an init routine
//! uses to seed the tempo.

use byteorder::{ByteOrder, LittleEndian};

/// Opcodes referenced by the heuristics.
#[allow(missing_docs)]
pub mod opcodes {
    pub const BRK: u8 = 0x00;
    pub const RTI: u8 = 0x40;
    pub const RTS: u8 = 0x60;
    pub const NOP: u8 = 0xEA;
    pub const SEI: u8 = 0x78;
    pub const JSR: u8 = 0x20;
    pub const JMP_ABS: u8 = 0x4C;
    pub const LDA_IMM: u8 = 0xA9;
    pub const STA_ABS: u8 = 0x8D;
}

/// Whether `byte` is one of the opcodes that mark a region as code.
pub fn is_code_opcode(byte: u8) -> bool {
    matches!(
        byte,
        opcodes::RTS | opcodes::RTI | opcodes::NOP | opcodes::BRK
    )
}

/// Fraction of bytes in `data` that are common code opcodes.
pub fn code_opcode_ratio(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let hits = data.iter().filter(|&&b| is_code_opcode(b)).count();
    hits as f64 / data.len() as f64
}

/// An `LDA #imm` immediately followed by `STA abs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmediateStore {
    /// Offset of the `LDA` opcode
    pub offset: usize,
    /// Immediate value loaded
    pub value: u8,
    /// Absolute store target
    pub target: u16,
}

/// Decode an `LDA #imm; STA abs` pair at `offset`.
pub fn immediate_store_at(data: &[u8], offset: usize) -> Option<ImmediateStore> {
    let window = data.get(offset..offset + 5)?;
    if window[0] != opcodes::LDA_IMM || window[2] != opcodes::STA_ABS {
        return None;
    }
    Some(ImmediateStore {
        offset,
        value: window[1],
        target: LittleEndian::read_u16(&window[3..5]),
    })
}

/// Iterate every `LDA #imm; STA abs` pair in `data`.
pub fn immediate_stores(data: &[u8]) -> impl Iterator<Item = ImmediateStore> + '_ {
    memchr::memchr_iter(opcodes::LDA_IMM, data).filter_map(move |i| immediate_store_at(data, i))
}
