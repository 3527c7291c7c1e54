//! CPU Status Register (P register) flags.
//!
//! The 6502 status register is an 8-bit register that contains various flags
//! reflecting the state of the processor:
//!
//! ```text
//! 7  6  5  4  3  2  1  0
//! N  V  U  B  D  I  Z  C
//! │  │  │  │  │  │  │  └─ Carry
//! │  │  │  │  │  │  └──── Zero
//! │  │  │  │  │  └─────── Interrupt Disable
//! │  │  │  │  └────────── Decimal Mode (not used in NES but still functional)
//! │  │  │  └───────────── Break (1 when pushed from PHP/BRK, 0 from IRQ/NMI)
//! │  │  └──────────────── Unused (always 1 when pushed to stack)
//! │  └─────────────────── Overflow
//! └────────────────────── Negative
//! ```

use bitflags::bitflags;

bitflags! {
    /// CPU Status Register flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u8 {
        /// Carry flag - set on unsigned overflow/underflow from bit 7/bit 0.
        const CARRY = 1 << 0;
        /// Zero flag - set if the result of the last operation was zero.
        const ZERO = 1 << 1;
        /// Interrupt Disable flag - when set, IRQ interrupts are ignored.
        const INTERRUPT_DISABLE = 1 << 2;
        /// Decimal Mode flag - functional but never consulted by ADC/SBC on this CPU.
        const DECIMAL = 1 << 3;
        /// Break flag - 1 when pushed by PHP/BRK, 0 when pushed by IRQ/NMI.
        const BREAK = 1 << 4;
        /// Unused flag - always 1 when pushed to the stack.
        const UNUSED = 1 << 5;
        /// Overflow flag - set on signed overflow.
        const OVERFLOW = 1 << 6;
        /// Negative flag - set if bit 7 of the result is set.
        const NEGATIVE = 1 << 7;
    }
}

impl StatusFlags {
    /// Initial status after power-on: I and U set, matches documented 6502 power-up P=$34.
    pub const POWER_ON: Self = Self::INTERRUPT_DISABLE.union(Self::UNUSED).union(Self::BREAK);

    /// Mask of flags restored by PLP/RTI (B and U are not stored in the register itself).
    pub const PLP_MASK: Self = Self::CARRY
        .union(Self::ZERO)
        .union(Self::INTERRUPT_DISABLE)
        .union(Self::DECIMAL)
        .union(Self::OVERFLOW)
        .union(Self::NEGATIVE);

    /// Creates a new status register with default power-on flags.
    #[must_use]
    pub const fn new() -> Self {
        Self::POWER_ON
    }

    /// Sets the Zero and Negative flags based on a value.
    #[inline]
    pub fn set_zn(&mut self, value: u8) {
        self.set(Self::ZERO, value == 0);
        self.set(Self::NEGATIVE, value & 0x80 != 0);
    }

    /// Converts this status register to a byte suitable for pushing to the stack.
    /// U is always set; B is set only when `brk` is true (PHP/BRK vs. IRQ/NMI).
    #[inline]
    #[must_use]
    pub const fn to_stack_byte(self, brk: bool) -> u8 {
        let mut value = self.bits() | Self::UNUSED.bits();
        if brk {
            value |= Self::BREAK.bits();
        } else {
            value &= !Self::BREAK.bits();
        }
        value
    }

    /// Builds a status register from a byte popped off the stack.
    /// B is discarded (it is not a real register bit); U is always forced set.
    #[inline]
    #[must_use]
    pub fn from_stack_byte(value: u8) -> Self {
        Self::from_bits_truncate((value & !Self::BREAK.bits()) | Self::UNUSED.bits())
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::new()
    }
}
