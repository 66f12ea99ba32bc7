//! Target profile: which registers are poked before the receiving program is
//! uploaded, and where that program is linked to run.
//!
//! The engine treats these commands as opaque; it only serializes them and
//! checks the length of the read-back.

use crate::protocol::MonitorCommand;

/// RAM address the receiving program is linked for.
pub const DEFAULT_LOAD_ADDRESS: u32 = 0x0020_2000;

/// Bytes echoed by the final read command of [`INITIAL_INSTRUCTIONS`].
pub const INIT_REPLY_LEN: usize = 4;

const MC_FMR: u32 = 0xFFFF_FF60;
const PMC_PCER: u32 = 0xFFFF_FC10;
const AIC_IDCR: u32 = 0xFFFF_F124;
const AIC_ICCR: u32 = 0xFFFF_F128;
const AIC_SPU: u32 = 0xFFFF_F134;
const PIT_MR: u32 = 0xFFFF_FD30;

/// Register setup sent right after the handshake.
pub const INITIAL_INSTRUCTIONS: [MonitorCommand; 6] = [
    // Flash wait states
    MonitorCommand::WriteWord {
        address: MC_FMR,
        value: 0x0034_0100,
    },
    // Peripheral clock gating
    MonitorCommand::WriteWord {
        address: PMC_PCER,
        value: 0x0000_0004,
    },
    // Mask and clear every interrupt source
    MonitorCommand::WriteWord {
        address: AIC_IDCR,
        value: 0xFFFF_FFFF,
    },
    MonitorCommand::WriteWord {
        address: AIC_ICCR,
        value: 0xFFFF_FFFF,
    },
    // Spurious interrupt vector
    MonitorCommand::WriteWord {
        address: AIC_SPU,
        value: 0x0000_0000,
    },
    MonitorCommand::ReadWord {
        address: MC_FMR,
        count: 4,
    },
];

/// Stops the periodic interval timer so it cannot fire while the receiving
/// program owns the CPU.
pub const DISABLE_TIMER_INTERRUPT: MonitorCommand = MonitorCommand::WriteWord {
    address: PIT_MR,
    value: 0,
};

/// Fixed per-target parameters used by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProfile {
    /// Register setup sent after the handshake.
    pub initial_instructions: Vec<MonitorCommand>,
    /// Bytes expected back from the register setup.
    pub init_reply_len: usize,
    /// Command that silences the target's own interrupt source.
    pub interrupt_disable: MonitorCommand,
}

impl Default for TargetProfile {
    fn default() -> Self {
        Self {
            initial_instructions: INITIAL_INSTRUCTIONS.to_vec(),
            init_reply_len: INIT_REPLY_LEN,
            interrupt_disable: DISABLE_TIMER_INTERRUPT,
        }
    }
}
