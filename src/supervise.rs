//! Supervised execution of the wrapped handler
//!
//! [`supervise`] polls a future under `catch_unwind` and turns a panic into
//! a [`PanicRecovered`] value carrying the panic message and the backtrace
//! captured at the panic site. The backtrace comes from a process-wide
//! panic hook (installed once, chaining to the previous hook) that stores
//! it in a thread-local slot; the future is polled on the panicking thread,
//! so the slot is read back on the same thread right after the unwind.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use futures::FutureExt;

thread_local! {
    static LAST_PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// A panic caught while running the inner handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicRecovered {
    pub message: String,
    pub backtrace: String,
}

impl PanicRecovered {
    /// Panic message followed by the backtrace, as sent in alerts
    pub fn report(&self) -> String {
        format!("{}\n{}", self.message, self.backtrace)
    }
}

/// Install the backtrace-recording panic hook (idempotent)
pub fn install_panic_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            LAST_PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// Run `fut` to completion, converting a panic into [`PanicRecovered`]
pub async fn supervise<F>(fut: F) -> Result<F::Output, PanicRecovered>
where
    F: Future,
{
    install_panic_hook();
    LAST_PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take());

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(output) => Ok(output),
        Err(payload) => {
            let backtrace = LAST_PANIC_BACKTRACE
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_else(|| Backtrace::force_capture().to_string());
            Err(PanicRecovered {
                message: panic_message(payload.as_ref()),
                backtrace,
            })
        }
    }
}
