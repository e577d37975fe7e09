//! Signal bridge: synchronous hardware signals as catchable exceptions.
//!
//! A `try signal` region captures a sigsetjmp point (through a small C shim,
//! `src/sjlj.c`) before running its body. While any region is active on any
//! thread, process-wide handlers are installed for the guarded signals; each
//! installation is undone by a protection-list finalizer when the region
//! that triggered it is left, restoring the handlers that were there before.
//!
//! The handler itself stays inside the async-signal-safe subset: it reads
//! one thread-local pointer, optionally records the fault address in a
//! thread-local cell, and siglongjmps the signal number back to the region
//! entry. Everything else — composing the raised record, selecting a catch
//! clause — happens in ordinary context after the jump. A signal on a thread
//! with no active region is forwarded to the previously installed handler,
//! or re-executed under the original disposition, exactly as if the bridge
//! were not there.

use crate::frame::{BodyOutcome, FrameGuard};

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use core::cell::Cell;
        use core::mem::{self, MaybeUninit};
        use core::ptr;
        use std::any::Any;
        use std::borrow::Cow;
        use std::cell::UnsafeCell;
        use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::{Mutex, Once};

        use crate::except::{
            Exception, Raised, SIG_ABRT, SIG_BUS, SIG_FPE, SIG_ILL, SIG_INT, SIG_SEGV, SIG_TERM,
        };
        use crate::frame::protect;
        use crate::state::{defer_thread, with_state};
        use crate::throw::{store_record, ThrowSignal};

        extern "C" {
            fn throw_this_sigsetjmp(
                buf_storage: *mut *mut libc::c_void,
                body: extern "C" fn(*mut u8),
                payload: *mut u8,
            ) -> libc::c_int;
            fn throw_this_siglongjmp(buf: *mut libc::c_void, signum: libc::c_int) -> !;
        }

        const GUARDED: [libc::c_int; 7] = [
            libc::SIGSEGV,
            libc::SIGFPE,
            libc::SIGBUS,
            libc::SIGILL,
            libc::SIGABRT,
            libc::SIGINT,
            libc::SIGTERM,
        ];

        fn descriptor_for(signum: libc::c_int) -> &'static Exception {
            match signum {
                libc::SIGFPE => &SIG_FPE,
                libc::SIGBUS => &SIG_BUS,
                libc::SIGILL => &SIG_ILL,
                libc::SIGABRT => &SIG_ABRT,
                libc::SIGINT => &SIG_INT,
                libc::SIGTERM => &SIG_TERM,
                // Only guarded signals can longjmp here; SIGSEGV covers the rest.
                _ => &SIG_SEGV,
            }
        }

        thread_local! {
            /// Innermost active region's jmp buf on this thread, null outside
            /// any region. Const-initialized so the handler never triggers a
            /// lazy TLS initializer.
            static ACTIVE_JMP: Cell<*mut libc::c_void> = const { Cell::new(ptr::null_mut()) };
            /// Fault address recorded by the handler for SIGSEGV/SIGBUS.
            static FAULT_ADDR: Cell<usize> = const { Cell::new(0) };
            static ALT_STACK_READY: Cell<bool> = const { Cell::new(false) };
        }

        // ============================================================
        // Handler installation
        // ============================================================

        struct SavedActions(UnsafeCell<MaybeUninit<[libc::sigaction; GUARDED.len()]>>);

        // SAFETY: written only under the REGIONS lock before any region is
        // live; the handler reads it while installed.
        unsafe impl Sync for SavedActions {}

        static SAVED: SavedActions = SavedActions(UnsafeCell::new(MaybeUninit::uninit()));

        /// Count of live `try signal` regions process-wide. Handlers are
        /// installed with the first and restored with the last.
        static REGIONS: Mutex<usize> = Mutex::new(0);

        static DEGRADED: AtomicBool = AtomicBool::new(false);

        fn warn_degraded() {
            static ONCE: Once = Once::new();
            ONCE.call_once(|| {
                log::warn!(
                    "signal handlers could not be installed; `try signal` degrades to `try`"
                );
            });
        }

        fn install_handlers() -> bool {
            if DEGRADED.load(Ordering::Relaxed) {
                return false;
            }
            let mut regions = REGIONS.lock().unwrap_or_else(|p| p.into_inner());
            if *regions > 0 {
                *regions += 1;
                return true;
            }
            // SAFETY: plain sigaction installation; rolled back on failure.
            unsafe {
                let mut previous: [libc::sigaction; GUARDED.len()] = mem::zeroed();
                for (index, signum) in GUARDED.iter().enumerate() {
                    let mut action: libc::sigaction = mem::zeroed();
                    // SA_SIGINFO for the fault address, SA_ONSTACK so a
                    // blown stack can still be reported, SA_NODEFER so a
                    // fault inside the handler falls through to the system.
                    action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK | libc::SA_NODEFER;
                    action.sa_sigaction = fault_handler as usize;
                    libc::sigemptyset(&mut action.sa_mask);
                    if libc::sigaction(*signum, &action, &mut previous[index]) != 0 {
                        for undo in 0..index {
                            libc::sigaction(GUARDED[undo], &previous[undo], ptr::null_mut());
                        }
                        DEGRADED.store(true, Ordering::Relaxed);
                        warn_degraded();
                        return false;
                    }
                }
                (*SAVED.0.get()).write(previous);
            }
            *regions = 1;
            true
        }

        fn restore_handlers() {
            let mut regions = REGIONS.lock().unwrap_or_else(|p| p.into_inner());
            *regions -= 1;
            if *regions == 0 {
                // SAFETY: SAVED was initialized when the count went 0 -> 1.
                unsafe {
                    let previous = (*SAVED.0.get()).assume_init_ref();
                    for (index, signum) in GUARDED.iter().enumerate() {
                        libc::sigaction(*signum, &previous[index], ptr::null_mut());
                    }
                }
            }
        }

        unsafe extern "C" fn fault_handler(
            signum: libc::c_int,
            info: *mut libc::siginfo_t,
            context: *mut libc::c_void,
        ) {
            let jmp = ACTIVE_JMP.with(|c| c.get());
            if jmp.is_null() {
                // Not ours: no region is active on the faulting thread.
                forward_to_previous(signum, info, context);
                return;
            }
            if signum == libc::SIGSEGV || signum == libc::SIGBUS {
                FAULT_ADDR.with(|c| c.set(fault_address(info)));
            }
            throw_this_siglongjmp(jmp, signum)
        }

        #[cfg(any(target_os = "linux", target_os = "android"))]
        unsafe fn fault_address(info: *mut libc::siginfo_t) -> usize {
            (*info).si_addr() as usize
        }

        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        unsafe fn fault_address(info: *mut libc::siginfo_t) -> usize {
            (*info).si_addr as usize
        }

        #[cfg(not(any(
            target_os = "linux",
            target_os = "android",
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd"
        )))]
        unsafe fn fault_address(_info: *mut libc::siginfo_t) -> usize {
            0
        }

        /// Hand the signal to whatever was installed before us. Restoring the
        /// original disposition and returning re-executes the faulting
        /// instruction under that disposition.
        unsafe fn forward_to_previous(
            signum: libc::c_int,
            info: *mut libc::siginfo_t,
            context: *mut libc::c_void,
        ) {
            let index = match GUARDED.iter().position(|s| *s == signum) {
                Some(index) => index,
                None => return,
            };
            let previous = (*SAVED.0.get()).assume_init_ref()[index];
            if previous.sa_flags & libc::SA_SIGINFO != 0 {
                let handler = mem::transmute::<
                    usize,
                    extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void),
                >(previous.sa_sigaction);
                handler(signum, info, context)
            } else if previous.sa_sigaction == libc::SIG_DFL
                || previous.sa_sigaction == libc::SIG_IGN
            {
                libc::sigaction(signum, &previous, ptr::null_mut());
            } else {
                let handler =
                    mem::transmute::<usize, extern "C" fn(libc::c_int)>(previous.sa_sigaction);
                handler(signum)
            }
        }

        // ============================================================
        // Per-thread alternate stack
        // ============================================================

        fn ensure_alt_stack() {
            ALT_STACK_READY.with(|ready| {
                if ready.get() {
                    return;
                }
                ready.set(true);
                // SAFETY: query-then-install of this thread's signal stack.
                unsafe {
                    let mut current: libc::stack_t = mem::zeroed();
                    if libc::sigaltstack(ptr::null(), &mut current) == 0
                        && current.ss_flags & libc::SS_DISABLE == 0
                    {
                        // The runtime already provides one (Rust's main and
                        // spawned threads normally do).
                        return;
                    }
                    let size = libc::SIGSTKSZ.max(64 * 1024);
                    let base = libc::mmap(
                        ptr::null_mut(),
                        size,
                        libc::PROT_READ | libc::PROT_WRITE,
                        libc::MAP_PRIVATE | libc::MAP_ANON,
                        -1,
                        0,
                    );
                    if base == libc::MAP_FAILED {
                        log::warn!(
                            "could not map an alternate signal stack; stack faults may not be recoverable"
                        );
                        return;
                    }
                    let stack = libc::stack_t {
                        ss_sp: base,
                        ss_flags: 0,
                        ss_size: size,
                    };
                    if libc::sigaltstack(&stack, ptr::null_mut()) != 0 {
                        libc::munmap(base, size);
                        return;
                    }
                    defer_thread(move || {
                        // SAFETY: installed above on this same thread; every
                        // region is closed by thread-exit time.
                        unsafe {
                            let disable = libc::stack_t {
                                ss_sp: ptr::null_mut(),
                                ss_flags: libc::SS_DISABLE,
                                ss_size: size,
                            };
                            libc::sigaltstack(&disable, ptr::null_mut());
                            libc::munmap(base, size);
                        }
                    });
                }
            });
        }

        // ============================================================
        // Region entry
        // ============================================================

        enum SjljOutcome {
            Completed,
            Thrown,
            Foreign(Box<dyn Any + Send>),
        }

        struct SjljPayload<F> {
            body: Option<F>,
            outcome: SjljOutcome,
            buf_storage: *mut *mut libc::c_void,
        }

        extern "C" fn trampoline<F: FnOnce()>(raw: *mut u8) {
            // SAFETY: `raw` is the SjljPayload<F> passed by run_signal_body.
            let payload = unsafe { &mut *(raw as *mut SjljPayload<F>) };
            // SAFETY: the shim fills the storage before invoking us.
            let jmp = unsafe { *payload.buf_storage };
            ACTIVE_JMP.with(|c| c.set(jmp));
            let Some(body) = payload.body.take() else { return };
            // Nothing may unwind across this extern "C" frame.
            payload.outcome = match catch_unwind(AssertUnwindSafe(body)) {
                Ok(()) => SjljOutcome::Completed,
                Err(p) if p.is::<ThrowSignal>() => SjljOutcome::Thrown,
                Err(p) => SjljOutcome::Foreign(p),
            };
        }

        impl FrameGuard {
            /// Run a `try signal` body: like [`run_body`](Self::run_body),
            /// but guarded signals raised by the body are translated into
            /// catchable records instead of taking the process down.
            ///
            /// A caught signal discards the body's live stack frames without
            /// running their destructors, so bodies should not hold droppable
            /// resources across faultable operations; register cleanup with
            /// [`protect`] instead.
            pub fn run_signal_body<F: FnOnce()>(&self, body: F) -> BodyOutcome {
                if !install_handlers() {
                    return self.run_body(body);
                }
                with_state(|s| s.frames[self.depth()].signal_region = true);
                protect(restore_handlers);
                ensure_alt_stack();

                let mut buf: *mut libc::c_void = ptr::null_mut();
                let mut payload = SjljPayload {
                    body: Some(body),
                    outcome: SjljOutcome::Completed,
                    buf_storage: &mut buf,
                };

                let saved_jmp = ACTIVE_JMP.with(|c| c.get());
                self.set_body_active(true);
                // SAFETY: the trampoline never unwinds (it catches), and the
                // payload outlives the call.
                let signum = unsafe {
                    throw_this_sigsetjmp(
                        &mut buf,
                        trampoline::<F>,
                        &mut payload as *mut SjljPayload<F> as *mut u8,
                    )
                };
                ACTIVE_JMP.with(|c| c.set(saved_jmp));
                self.set_body_active(false);

                if signum != 0 {
                    let (file, line) = with_state(|s| {
                        let frame = &mut s.frames[self.depth()];
                        // A fault inside with_frame_arena abandons the
                        // borrow; clear it so the frame stays usable.
                        frame.arena_borrowed = false;
                        (frame.file, frame.line)
                    });
                    let fault = FAULT_ADDR.with(|c| c.replace(0));
                    let message = if fault != 0 {
                        Some(Cow::Owned(format!("fault address {fault:#x}")))
                    } else {
                        None
                    };
                    let mut record =
                        Raised::new(descriptor_for(signum), file, line, message, None);
                    record.from_signal = true;
                    store_record(record);
                    // The jump discarded any frames the body had entered;
                    // run their finalizers and pop them before dispatching.
                    crate::frame::unwind_skipped_frames(self.depth());
                    self.mark_thrown();
                    return BodyOutcome::Thrown;
                }

                match mem::replace(&mut payload.outcome, SjljOutcome::Completed) {
                    SjljOutcome::Completed => BodyOutcome::Completed,
                    SjljOutcome::Thrown => {
                        self.mark_thrown();
                        BodyOutcome::Thrown
                    }
                    SjljOutcome::Foreign(p) => resume_unwind(p),
                }
            }
        }
    } else {
        use std::sync::Once;

        impl FrameGuard {
            /// Signal translation needs POSIX signals; elsewhere a
            /// `try signal` region behaves exactly like `try`.
            pub fn run_signal_body<F: FnOnce()>(&self, body: F) -> BodyOutcome {
                static ONCE: Once = Once::new();
                ONCE.call_once(|| {
                    log::warn!(
                        "signal recovery is not supported on this platform; `try signal` degrades to `try`"
                    );
                });
                self.run_body(body)
            }
        }
    }
}
