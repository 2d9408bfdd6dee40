//! Fault-free memory probing.

/// Read access to the target's address space. Implementations must never
/// fault: an unmapped or protected address yields `None`.
pub trait MemoryReader: Send + Sync {
    fn read_u8(&self, address: u64) -> Option<u8>;

    fn read_pointer(&self, address: u64) -> Option<u64>;

    fn is_readable(&self, address: u64) -> bool {
        self.read_u8(address).is_some()
    }
}

/// Reads the tracer's own address space.
///
/// Each read first pushes the bytes through a pipe: the kernel reports
/// `EFAULT` for an unreadable source instead of delivering `SIGSEGV`.
pub struct LocalMemory {
    read_fd: libc::c_int,
    write_fd: libc::c_int,
}

impl LocalMemory {
    pub fn new() -> std::io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self { read_fd: fds[0], write_fd: fds[1] })
    }

    fn probe(&self, address: u64, len: usize) -> bool {
        if address == 0 {
            return false;
        }
        let written = unsafe { libc::write(self.write_fd, address as *const libc::c_void, len) };
        if written <= 0 {
            return false;
        }
        // Drain so the pipe never fills up.
        let mut sink = [0u8; 16];
        unsafe { libc::read(self.read_fd, sink.as_mut_ptr() as *mut libc::c_void, written as usize) };
        written as usize == len
    }
}

impl MemoryReader for LocalMemory {
    fn read_u8(&self, address: u64) -> Option<u8> {
        if !self.probe(address, 1) {
            return None;
        }
        Some(unsafe { std::ptr::read_volatile(address as *const u8) })
    }

    fn read_pointer(&self, address: u64) -> Option<u64> {
        let size = std::mem::size_of::<usize>();
        if !self.probe(address, size) {
            return None;
        }
        Some(unsafe { std::ptr::read_unaligned(address as *const usize) } as u64)
    }
}

impl Drop for LocalMemory {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}
