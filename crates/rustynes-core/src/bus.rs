//! NES System Bus Implementation.
//!
//! The bus connects the CPU to all other components:
//! - PPU registers ($2000-$2007, mirrored every 8 bytes to $3FFF)
//! - APU/IO registers ($4000-$4017)
//! - Cartridge space ($4020-$FFFF)
//! - Internal RAM ($0000-$07FF, mirrored to $1FFF)

use rustynes_apu::Apu;
use rustynes_cpu::Bus;
use rustynes_mappers::Mapper;
use rustynes_ppu::{Mirroring as PpuMirroring, Ppu};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use crate::input::Controller;

/// Convert a mapper's mirroring mode to the PPU's own mirroring type.
///
/// The two crates each define their own `Mirroring` enum at their respective
/// seams (cartridge contract vs. internal nametable RAM), so the bus is
/// where the two get reconciled.
fn to_ppu_mirroring(mirroring: rustynes_mappers::Mirroring) -> PpuMirroring {
    match mirroring {
        rustynes_mappers::Mirroring::Horizontal => PpuMirroring::Horizontal,
        rustynes_mappers::Mirroring::Vertical => PpuMirroring::Vertical,
        rustynes_mappers::Mirroring::SingleScreenLower => PpuMirroring::SingleScreenLower,
        rustynes_mappers::Mirroring::SingleScreenUpper => PpuMirroring::SingleScreenUpper,
        rustynes_mappers::Mirroring::FourScreen => PpuMirroring::FourScreen,
    }
}

/// State of an in-progress OAM DMA transfer, stepped one bus cycle at a time.
struct OamDmaState {
    /// Base address of the source page (`page << 8`).
    base: u16,
    /// Byte index into the 256-byte transfer.
    index: u16,
    /// Byte most recently read, waiting to be written to OAM.
    latch: u8,
    /// Whether the next cycle reads (`true`) or writes (`false`).
    reading: bool,
    /// Alignment cycles remaining before the read/write cycles begin.
    wait: u8,
}

/// NES system bus connecting all components.
pub struct NesBus {
    /// Internal RAM (2KB, mirrored 4 times).
    pub ram: [u8; 2048],
    /// PPU (Picture Processing Unit).
    pub ppu: Ppu,
    /// APU (Audio Processing Unit).
    pub apu: Apu,
    /// Cartridge mapper.
    pub mapper: Box<dyn Mapper>,
    /// Controller 1.
    pub controller1: Controller,
    /// Controller 2.
    pub controller2: Controller,
    /// OAM DMA page armed by a `$4014` write, not yet started.
    oam_dma_page: Option<u8>,
    /// OAM DMA transfer currently in flight.
    oam_dma: Option<OamDmaState>,
    /// CPU cycle counter for DMA timing.
    cpu_cycles: u64,
    /// DMC DMA stall cycles.
    dmc_stall_cycles: u8,
    /// Last value on the data bus (for open bus behavior).
    last_bus_value: u8,
    /// NMI pending from PPU.
    nmi_pending: bool,
    /// IRQ pending from mapper/APU.
    irq_pending: bool,
    /// Sample accumulator for downsampling.
    sample_count: u32,
    /// Sample sum for averaging.
    sample_sum: f32,
}

impl NesBus {
    /// CPU cycles per audio sample (at 44100 Hz).
    const CYCLES_PER_SAMPLE: u32 = 40; // ~1789773 / 44100

    /// Create a new NES bus with the given mapper.
    pub fn new(mapper: Box<dyn Mapper>) -> Self {
        let mirroring = to_ppu_mirroring(mapper.mirroring());

        Self {
            ram: [0; 2048],
            ppu: Ppu::new(mirroring),
            apu: Apu::new(),
            mapper,
            controller1: Controller::new(),
            controller2: Controller::new(),
            oam_dma_page: None,
            oam_dma: None,
            cpu_cycles: 0,
            dmc_stall_cycles: 0,
            last_bus_value: 0,
            nmi_pending: false,
            irq_pending: false,
            sample_count: 0,
            sample_sum: 0.0,
        }
    }

    /// Reset the bus and all components.
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.ppu.reset();
        self.apu.reset();
        self.mapper.reset();
        self.ppu.set_mirroring(to_ppu_mirroring(self.mapper.mirroring()));
        self.controller1.reset();
        self.controller2.reset();
        self.oam_dma_page = None;
        self.oam_dma = None;
        self.cpu_cycles = 0;
        self.dmc_stall_cycles = 0;
        self.last_bus_value = 0;
        self.nmi_pending = false;
        self.irq_pending = false;
        self.sample_count = 0;
        self.sample_sum = 0.0;
    }

    /// Check if an OAM DMA transfer is armed or in flight.
    #[must_use]
    pub fn oam_dma_pending(&self) -> bool {
        self.oam_dma_page.is_some() || self.oam_dma.is_some()
    }

    /// Advance an OAM DMA transfer by one CPU cycle.
    ///
    /// Reads and writes are done one byte at a time, one per cycle, through
    /// the same memory map `Bus::read` uses (so DMA sourced from PPU/APU
    /// registers or PRG-RAM sees the same side effects and mid-transfer
    /// state a CPU-driven read would). Returns `true` if this cycle was
    /// claimed by the transfer, meaning the CPU's own state machine must not
    /// advance.
    pub fn step_oam_dma(&mut self) -> bool {
        if self.oam_dma.is_none() {
            let Some(page) = self.oam_dma_page.take() else {
                return false;
            };
            // The transfer always costs one alignment cycle to begin, plus a
            // second if DMA was armed on an odd CPU cycle.
            let wait = if self.cpu_cycles % 2 == 1 { 2 } else { 1 };
            self.oam_dma = Some(OamDmaState {
                base: u16::from(page) << 8,
                index: 0,
                latch: 0,
                reading: true,
                wait,
            });
        }

        // Take the state out so `self.read()` below (which needs all of
        // `self`, not just `self.oam_dma`) isn't fighting a live borrow of it.
        let mut state = self.oam_dma.take().expect("just populated above");

        if state.wait > 0 {
            state.wait -= 1;
            self.oam_dma = Some(state);
            return true;
        }

        if state.reading {
            let addr = state.base.wrapping_add(state.index);
            state.latch = self.read(addr);
            state.reading = false;
            self.oam_dma = Some(state);
        } else {
            self.ppu.oam_write_byte(state.latch);
            state.index += 1;
            if state.index < 256 {
                state.reading = true;
                self.oam_dma = Some(state);
            }
            // else: transfer complete, leave self.oam_dma as None
        }
        true
    }

    /// Run an OAM DMA transfer to completion in one call.
    ///
    /// Convenience wrapper around [`Self::step_oam_dma`] for callers that
    /// don't need cycle-by-cycle interleaving with the PPU/APU.
    ///
    /// Returns the number of CPU cycles the transfer consumed.
    pub fn execute_oam_dma(&mut self) -> u16 {
        let mut cycles = 0u16;
        while self.step_oam_dma() {
            cycles += 1;
        }
        cycles
    }

    /// Step the PPU by 3 dots (one CPU cycle worth).
    ///
    /// Returns true if NMI should be triggered.
    pub fn step_ppu(&mut self) -> bool {
        let mut nmi = false;

        for _ in 0..3 {
            let (_, dot_nmi) = self.ppu.step_with_chr(|addr| self.mapper.read_chr(addr));
            if dot_nmi {
                nmi = true;
            }

            // Mapper IRQ counters clocked off the PPU A12 line (MMC3 and kin)
            // need to see every rising edge, not just one per CPU cycle.
            if self.ppu.take_a12_rising_edge() {
                self.mapper.ppu_a12_rising();
            }
        }

        self.mapper.clock(1);

        if nmi {
            self.nmi_pending = true;
        }

        nmi
    }

    /// Step the APU by one CPU cycle.
    ///
    /// Returns audio sample if available.
    pub fn step_apu(&mut self) -> Option<f32> {
        self.apu.clock();

        // Handle DMC sample fetch
        if self.apu.dmc_needs_sample() {
            let addr = self.apu.dmc_sample_addr();
            let sample = self.mapper.read_prg(addr);
            self.apu.dmc_fill_sample(sample);
            // DMC DMA stalls CPU for 4 cycles
            self.dmc_stall_cycles = 4;
        }

        // Accumulate samples for downsampling
        self.sample_sum += self.apu.output();
        self.sample_count += 1;

        if self.sample_count >= Self::CYCLES_PER_SAMPLE {
            #[allow(clippy::cast_precision_loss)]
            let sample = self.sample_sum / self.sample_count as f32;
            self.sample_count = 0;
            self.sample_sum = 0.0;
            Some(sample)
        } else {
            None
        }
    }

    /// Check if NMI is pending.
    #[must_use]
    pub fn nmi_pending(&self) -> bool {
        self.nmi_pending
    }

    /// Acknowledge NMI.
    pub fn acknowledge_nmi(&mut self) {
        self.nmi_pending = false;
    }

    /// Check if IRQ is pending.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.irq_pending || self.mapper.irq_pending() || self.apu.irq_pending()
    }

    /// Acknowledge mapper IRQ.
    pub fn acknowledge_mapper_irq(&mut self) {
        self.mapper.irq_acknowledge();
    }

    /// Get the current CPU cycle count.
    #[must_use]
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu_cycles
    }

    /// Increment CPU cycle count.
    pub fn add_cpu_cycles(&mut self, cycles: u8) {
        self.cpu_cycles += u64::from(cycles);
    }

    /// Check if DMC stall is active.
    #[must_use]
    pub fn dmc_stall_active(&self) -> bool {
        self.dmc_stall_cycles > 0
    }

    /// Decrement DMC stall counter.
    pub fn decrement_dmc_stall(&mut self) {
        if self.dmc_stall_cycles > 0 {
            self.dmc_stall_cycles -= 1;
        }
    }

    /// Peek at memory without side effects.
    ///
    /// This is useful for debugging/display purposes where we don't want
    /// to trigger PPU register side effects or mapper state changes.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            // PPU registers - return last bus value to avoid side effects
            0x2000..=0x3FFF => self.last_bus_value,

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4015 => self.apu.peek_status(),
                _ => self.last_bus_value,
            },

            // APU test mode
            0x4018..=0x401F => self.last_bus_value,

            // Cartridge space
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
        }
    }
}

/// CPU bus implementation.
impl Bus for NesBus {
    fn read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            // PPU registers (mirrored every 8 bytes)
            0x2000..=0x3FFF => self.ppu.read_register(addr, |chr_addr| self.mapper.read_chr(chr_addr)),

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4015 => self.apu.read_status(),
                0x4016 => self.controller1.read(),
                0x4017 => self.controller2.read(),
                _ => self.last_bus_value, // Write-only registers
            },

            // APU test mode (normally disabled)
            0x4018..=0x401F => self.last_bus_value,

            // Cartridge space
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
        };

        self.last_bus_value = value;
        value
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.last_bus_value = val;

        match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => {
                self.ram[(addr & 0x07FF) as usize] = val;
            }

            // PPU registers (mirrored every 8 bytes)
            0x2000..=0x3FFF => {
                self.ppu
                    .write_register(addr, val, |chr_addr, chr_val| self.mapper.write_chr(chr_addr, chr_val));
            }

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4000..=0x4013 | 0x4015 | 0x4017 => {
                    self.apu.write(addr, val);
                }
                0x4014 => {
                    // OAM DMA
                    self.oam_dma_page = Some(val);
                }
                0x4016 => {
                    // $4016 writes strobe both controllers simultaneously
                    self.controller1.write_strobe(val);
                    self.controller2.write_strobe(val);
                }
                _ => {}
            },

            // APU test mode (normally disabled)
            0x4018..=0x401F => {}

            // Cartridge space
            0x4020..=0xFFFF => {
                self.mapper.write_prg(addr, val);
            }
        }
    }
}
