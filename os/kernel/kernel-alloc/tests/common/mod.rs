//! A simulated board: heap-backed RAM and a CP15 register file in `Cell`s.
//!
//! Physical addresses are byte offsets into the RAM buffer. Virtual
//! accesses are identity while SCTLR.M is clear; once it is set they walk
//! the L1 table TTBR0 points at, like the hardware would, and panic on a
//! translation fault.

#![allow(dead_code)]

use core::cell::Cell;
use kernel_info::memory::{MMU_TEMP_L2_ADDR, MMU_TEMP_MAP, MemoryLayout, PAT_ADDRESS, RESERVED_LOW_BYTES};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_registers::{ControlRegisters, Dacr, Sctlr, Ttbr0};
use kernel_vmem::{L1Descriptor, L1Type, L2Descriptor, L2Type, PhysMapper, VirtMapper, split_indices};

/// RAM of the simulated board.
pub const RAM_BYTES: u32 = 1024 * 1024;

/// The board layout shrunk to [`RAM_BYTES`] of RAM.
pub const LAYOUT: MemoryLayout = MemoryLayout {
    total_memory: RAM_BYTES,
    l1_table: PhysicalAddress::new(0),
    pat: PhysicalAddress::new(PAT_ADDRESS),
    temp_l2_slot: PhysicalAddress::new(MMU_TEMP_L2_ADDR),
    temp_window: VirtualAddress::new(MMU_TEMP_MAP),
    reserved_low_bytes: RESERVED_LOW_BYTES,
};

#[repr(C, align(16384))]
struct Chunk([u8; 16384]);

pub struct Machine {
    ram: Vec<Chunk>,
    base: *mut u8,
    pub sctlr: Cell<u32>,
    pub ttbr0: Cell<u32>,
    pub dacr: Cell<u32>,
    pub invalidations: Cell<usize>,
    pub flushes: Cell<usize>,
}

impl Machine {
    pub fn new() -> Self {
        let mut ram: Vec<Chunk> = (0..RAM_BYTES as usize / 16384)
            .map(|_| Chunk([0; 16384]))
            .collect();
        let base = ram.as_mut_ptr().cast::<u8>();
        Self {
            ram,
            base,
            sctlr: Cell::new(0x00C5_0078),
            ttbr0: Cell::new(0),
            dacr: Cell::new(0),
            invalidations: Cell::new(0),
            flushes: Cell::new(0),
        }
    }

    fn check(&self, pa: u32, len: usize) -> usize {
        let off = pa as usize;
        assert!(off + len <= self.ram.len() * 16384, "{pa:#x} outside simulated RAM");
        off
    }

    pub fn read_u32(&self, pa: u32) -> u32 {
        let off = self.check(pa, 4);
        unsafe { self.base.add(off).cast::<u32>().read() }
    }

    pub fn write_u32(&self, pa: u32, value: u32) {
        let off = self.check(pa, 4);
        unsafe { self.base.add(off).cast::<u32>().write(value) }
    }

    pub fn fill(&self, pa: u32, len: u32, byte: u8) {
        let off = self.check(pa, len as usize);
        unsafe { self.base.add(off).write_bytes(byte, len as usize) }
    }

    pub fn translation_on(&self) -> bool {
        self.sctlr.get() & 1 != 0
    }

    /// Hardware-style walk from TTBR0; panics on a translation fault.
    pub fn translate(&self, va: VirtualAddress) -> PhysicalAddress {
        let (i1, i2) = split_indices(va);
        let root = self.ttbr0.get() & !0x3FFF;
        let l1 = L1Descriptor::from_bits(self.read_u32(root + 4 * i1.as_usize() as u32));
        assert_eq!(l1.kind(), L1Type::Coarse, "L1 translation fault at {va}");
        let l2 = L2Descriptor::from_bits(self.read_u32(l1.l2_table().as_u32() + 4 * i2.as_usize() as u32));
        assert_eq!(l2.kind(), L2Type::Small, "L2 translation fault at {va}");
        l2.phys_page().join(va.offset())
    }
}

impl PhysMapper for Machine {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let off = self.check(pa.as_u32(), size_of::<T>());
        unsafe { &mut *self.base.add(off).cast::<T>() }
    }
}

impl VirtMapper for Machine {
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        let pa = if self.translation_on() {
            self.translate(va)
        } else {
            PhysicalAddress::new(va.as_u32())
        };
        unsafe { self.phys_to_mut(pa) }
    }

    fn invalidate(&self, _va: VirtualAddress) {
        self.invalidations.set(self.invalidations.get() + 1);
    }

    fn invalidate_all(&self) {
        self.flushes.set(self.flushes.get() + 1);
    }
}

impl ControlRegisters for &Machine {
    fn read_control_register(&self) -> Sctlr {
        Sctlr::from_bits(self.sctlr.get())
    }

    unsafe fn write_control_register(&self, value: Sctlr) {
        self.sctlr.set(value.into_bits());
    }

    fn read_translation_table_base(&self) -> Ttbr0 {
        Ttbr0::from_bits(self.ttbr0.get())
    }

    unsafe fn write_translation_table_base(&self, value: Ttbr0) {
        self.ttbr0.set(value.into_bits());
    }

    fn read_domain_access_control(&self) -> Dacr {
        Dacr::from_bits(self.dacr.get())
    }

    unsafe fn write_domain_access_control(&self, value: Dacr) {
        self.dacr.set(value.into_bits());
    }
}
