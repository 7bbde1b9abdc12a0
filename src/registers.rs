//! Register access.
//!
//! This module contains the [`RegisterAccess`] trait, through which all the
//! accesses to the channelizer registers are made, and its two
//! implementations: [`MmioWindow`], which accesses the hardware through a UIO
//! mapping, and [`SimulatedRegisters`], which keeps the registers in memory.

use crate::error::{Result, VccError};
use crate::uio::Mapping;
use std::cell::{Cell, RefCell};
use vcell::VolatileCell;

/// Access to a window of 32-bit registers.
///
/// Registers are addressed by their byte offset from the start of the
/// window. Each call to [`RegisterAccess::read`] or [`RegisterAccess::write`]
/// corresponds to exactly one bus transaction. Offsets outside the window or
/// not aligned to 4 bytes are rejected without accessing the bus.
pub trait RegisterAccess: std::fmt::Debug {
    /// Address of the start of the register window.
    fn base_address(&self) -> usize;

    /// Size of the register window in bytes.
    fn size(&self) -> usize;

    /// Reads the register at `offset`.
    fn read(&self, offset: usize) -> Result<u32>;

    /// Writes `value` to the register at `offset`.
    fn write(&self, offset: usize, value: u32) -> Result<()>;

    /// Checks that `offset` addresses a full register inside the window.
    fn check_offset(&self, offset: usize) -> Result<()> {
        let base = self.base_address();
        if offset % 4 != 0 {
            return Err(VccError::UnalignedAddress(base.wrapping_add(offset)));
        }
        if offset.checked_add(4).is_none_or(|end| end > self.size()) {
            return Err(VccError::AddressOutOfRange {
                address: base.wrapping_add(offset),
                base,
                end: base.wrapping_add(self.size()),
            });
        }
        Ok(())
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for Box<T> {
    fn base_address(&self) -> usize {
        (**self).base_address()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn read(&self, offset: usize) -> Result<u32> {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) -> Result<()> {
        (**self).write(offset, value)
    }
}

/// Memory-mapped register window.
///
/// The registers are accessed with volatile loads and stores on a UIO
/// mapping. The base address reported is the physical address of the window,
/// so that callers never handle pointers into the mapping.
#[derive(Debug)]
pub struct MmioWindow {
    mapping: Mapping,
    phys_addr: usize,
}

// The mapping is only accessed through volatile loads and stores, and the
// owner of the MmioWindow serializes them.
unsafe impl Send for MmioWindow {}

impl MmioWindow {
    /// Creates a register window from a UIO mapping.
    ///
    /// The `phys_addr` is the physical address at which the mapping starts.
    pub fn new(mapping: Mapping, phys_addr: usize) -> Result<MmioWindow> {
        if mapping.addr() as usize % 4 != 0 {
            return Err(VccError::UnalignedAddress(mapping.addr() as usize));
        }
        Ok(MmioWindow { mapping, phys_addr })
    }

    fn cell(&self, offset: usize) -> &VolatileCell<u32> {
        // the offset has been checked to lie inside the mapping and be aligned
        unsafe { &*(self.mapping.addr().byte_add(offset) as *const VolatileCell<u32>) }
    }
}

impl RegisterAccess for MmioWindow {
    fn base_address(&self) -> usize {
        self.phys_addr
    }

    fn size(&self) -> usize {
        self.mapping.size()
    }

    fn read(&self, offset: usize) -> Result<u32> {
        self.check_offset(offset)?;
        Ok(self.cell(offset).get())
    }

    fn write(&self, offset: usize, value: u32) -> Result<()> {
        self.check_offset(offset)?;
        self.cell(offset).set(value);
        Ok(())
    }
}

/// Register bus transaction performed on [`SimulatedRegisters`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Access {
    /// Register read.
    Read {
        /// Offset of the register.
        offset: usize,
        /// Value read.
        value: u32,
    },
    /// Register write.
    Write {
        /// Offset of the register.
        offset: usize,
        /// Value written.
        value: u32,
    },
}

/// Simulated register window.
///
/// This keeps the registers in memory, with all of them initially zero. Every
/// successful access is recorded, so that the exact sequence of bus
/// transactions can be inspected. A bus fault can be injected with
/// [`SimulatedRegisters::set_fault`].
#[derive(Debug)]
pub struct SimulatedRegisters {
    base_address: usize,
    registers: RefCell<Vec<u32>>,
    accesses: RefCell<Vec<Access>>,
    fault: Cell<bool>,
}

impl SimulatedRegisters {
    /// Creates a simulated register window.
    ///
    /// The window starts at `base_address` and spans `size` bytes, rounded up
    /// to a whole number of registers.
    pub fn new(base_address: usize, size: usize) -> SimulatedRegisters {
        SimulatedRegisters {
            base_address,
            registers: RefCell::new(vec![0; size.div_ceil(4)]),
            accesses: RefCell::new(Vec::new()),
            fault: Cell::new(false),
        }
    }

    /// Returns the value of a register without performing a bus transaction.
    pub fn peek(&self, offset: usize) -> Option<u32> {
        if offset % 4 != 0 {
            return None;
        }
        self.registers.borrow().get(offset / 4).copied()
    }

    /// Returns the bus transactions performed so far.
    pub fn accesses(&self) -> Vec<Access> {
        self.accesses.borrow().clone()
    }

    /// Returns the bus transactions performed so far and clears the record.
    pub fn take_accesses(&self) -> Vec<Access> {
        self.accesses.take()
    }

    /// Makes every subsequent access fail with [`VccError::DeviceFault`]
    /// while `fault` is `true`.
    pub fn set_fault(&self, fault: bool) {
        self.fault.set(fault);
    }

    fn check_fault(&self, offset: usize) -> Result<()> {
        if self.fault.get() {
            return Err(VccError::DeviceFault(format!(
                "bus error at address {:#x}",
                self.base_address.wrapping_add(offset)
            )));
        }
        Ok(())
    }
}

impl RegisterAccess for SimulatedRegisters {
    fn base_address(&self) -> usize {
        self.base_address
    }

    fn size(&self) -> usize {
        self.registers.borrow().len() * 4
    }

    fn read(&self, offset: usize) -> Result<u32> {
        self.check_offset(offset)?;
        self.check_fault(offset)?;
        let value = self.registers.borrow()[offset / 4];
        self.accesses
            .borrow_mut()
            .push(Access::Read { offset, value });
        Ok(value)
    }

    fn write(&self, offset: usize, value: u32) -> Result<()> {
        self.check_offset(offset)?;
        self.check_fault(offset)?;
        self.registers.borrow_mut()[offset / 4] = value;
        self.accesses
            .borrow_mut()
            .push(Access::Write { offset, value });
        Ok(())
    }
}
