//! `critical-section` provider for ESP-IDF builds.
//!
//! The inbound channel (`embassy-sync`) locks a critical section around
//! every send and receive. Host builds get that lock from the
//! `critical-section/std` feature. On ESP-IDF the hooks below back it with
//! one process-wide mutex, re-entrant per thread because the MQTT event
//! task may nest sections.

#[cfg(target_os = "espidf")]
mod imp {
    use core::cell::RefCell;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static SECTION: Mutex<()> = Mutex::new(());

    /// Per-thread nesting depth plus the guard held while depth > 0.
    #[derive(Default)]
    struct Held {
        depth: u8,
        guard: Option<MutexGuard<'static, ()>>,
    }

    thread_local! {
        static HELD: RefCell<Held> = RefCell::new(Held::default());
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn _critical_section_1_0_acquire() -> u8 {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if held.depth == 0 {
                // Guards `()`: poisoning leaves nothing inconsistent.
                held.guard = Some(SECTION.lock().unwrap_or_else(PoisonError::into_inner));
            }
            held.depth = held.depth.saturating_add(1);
            held.depth
        })
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn _critical_section_1_0_release(_token: u8) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            match held.depth {
                0 => {}
                1 => {
                    held.depth = 0;
                    held.guard = None;
                }
                _ => held.depth -= 1,
            }
        });
    }
}
