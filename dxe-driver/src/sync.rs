//! Interrupt-priority-aware spin lock.
//!
//! Runtime services can be entered from any CPU and, on the OS side, from
//! an interrupt that lands while another call is inside the same hook. The
//! lock first raises the interrupt priority to [`DISPATCH_LEVEL`] and then
//! spins, and undoes both in the reverse order on release.

use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use crate::consts::DISPATCH_LEVEL;

/// Access to the current CPU's interrupt priority.
pub trait InterruptLevel {
    fn current() -> usize;
    fn set(level: usize);
}

/// Task priority register (CR8) on x86-64.
#[cfg(all(target_arch = "x86_64", target_os = "uefi"))]
pub struct Cr8;

#[cfg(all(target_arch = "x86_64", target_os = "uefi"))]
impl InterruptLevel for Cr8 {
    fn current() -> usize {
        let value: usize;
        // SAFETY: reading CR8 has no side effects at CPL0.
        unsafe { core::arch::asm!("mov {}, cr8", out(reg) value, options(nomem, nostack, preserves_flags)) };
        value
    }

    fn set(level: usize) {
        // SAFETY: firmware and OS kernel both run at CPL0.
        unsafe { core::arch::asm!("mov cr8, {}", in(reg) level, options(nomem, nostack, preserves_flags)) };
    }
}

/// Software priority for hosts without a task priority register.
pub struct SoftLevel;

static SOFT_LEVEL: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);

impl InterruptLevel for SoftLevel {
    fn current() -> usize {
        SOFT_LEVEL.load(core::sync::atomic::Ordering::Acquire)
    }

    fn set(level: usize) {
        SOFT_LEVEL.store(level, core::sync::atomic::Ordering::Release);
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "uefi"))]
pub type PlatformLevel = Cr8;
#[cfg(not(all(target_arch = "x86_64", target_os = "uefi")))]
pub type PlatformLevel = SoftLevel;

pub struct PriorityLock<T, L: InterruptLevel = PlatformLevel> {
    inner: spin::Mutex<T>,
    _level: PhantomData<fn() -> L>,
}

impl<T, L: InterruptLevel> PriorityLock<T, L> {
    pub const fn new(value: T) -> Self {
        Self { inner: spin::Mutex::new(value), _level: PhantomData }
    }

    pub fn lock(&self) -> PriorityGuard<'_, T, L> {
        let previous = L::current();
        debug_assert!(previous <= DISPATCH_LEVEL, "lock taken above dispatch level");
        if previous < DISPATCH_LEVEL {
            L::set(DISPATCH_LEVEL);
        }
        PriorityGuard { guard: Some(self.inner.lock()), previous, _level: PhantomData }
    }
}

pub struct PriorityGuard<'a, T, L: InterruptLevel> {
    guard: Option<spin::MutexGuard<'a, T>>,
    previous: usize,
    _level: PhantomData<fn() -> L>,
}

impl<T, L: InterruptLevel> Deref for PriorityGuard<'_, T, L> {
    type Target = T;

    fn deref(&self) -> &T {
        // only `None` inside `drop`
        self.guard.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl<T, L: InterruptLevel> DerefMut for PriorityGuard<'_, T, L> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T, L: InterruptLevel> Drop for PriorityGuard<'_, T, L> {
    fn drop(&mut self) {
        // release the spin lock before lowering the priority
        drop(self.guard.take());
        L::set(self.previous);
    }
}
