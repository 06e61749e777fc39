use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures::{future::poll_fn, FutureExt};
use serde_json::json;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Once;

use super::InboundState;
use crate::fields;
use crate::tracker::{self, TrackerId};

/// Event name of the record emitted for a recovered panic.
pub const PANIC_EVENT: &str = "PANIC";

/// Skip recovery for matching requests; their panics propagate.
pub type Skipper = fn(&Request) -> bool;

#[derive(Clone)]
pub struct RecoverConfig {
    /// Upper bound, in bytes, on the captured stack text.
    pub stack_size: usize,
    /// Include the stack in the record. The record is emitted either way.
    pub print_stack: bool,
    pub skipper: Option<Skipper>,
}

impl Default for RecoverConfig {
    fn default() -> Self {
        Self {
            stack_size: 4 << 10,
            print_stack: true,
            skipper: None,
        }
    }
}

/// A handler panic, converted into an error value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PanicError(pub String);

impl PanicError {
    /// Panic payloads are usually `&str` or `String`; anything else gets a
    /// generic description.
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        if let Some(s) = payload.downcast_ref::<&str>() {
            Self((*s).to_string())
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Self(s.clone())
        } else {
            Self("unknown panic payload".to_string())
        }
    }
}

impl IntoResponse for PanicError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Internal Server Error" })),
        )
            .into_response()
    }
}

/// Catch a panic from the rest of the pipeline, emit one error record with
/// the panic value and the captured stack, and answer 500.
pub async fn recover(
    State(state): State<InboundState>,
    req: Request,
    next: Next,
) -> Result<Response, PanicError> {
    let config = &state.recover;
    if config.skipper.is_some_and(|skip| skip(&req)) {
        return Ok(next.run(req).await);
    }

    let tracker_id = req
        .extensions()
        .get::<TrackerId>()
        .map(|id| id.to_string())
        .unwrap_or_else(tracker::current);

    let (payload, panic_stack) = match catch_with_stack(next.run(req)).await {
        Ok(response) => return Ok(response),
        Err(caught) => caught,
    };

    let err = PanicError::from_payload(payload.as_ref());
    let stack = if config.print_stack {
        let stack = panic_stack.unwrap_or_else(|| Backtrace::force_capture().to_string());
        truncate(stack, config.stack_size)
    } else {
        String::new()
    };

    let mut log = state.logger.event(PANIC_EVENT);
    log.set_tracker_id(tracker_id);
    log.error_with_data(
        &err.0,
        fields! { "trace" => format!("[PANIC RECOVER] {} {}\n", err, stack) },
        &err,
    );

    Err(err)
}

thread_local! {
    static ARMED: Cell<usize> = const { Cell::new(0) };
    static PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chain a panic hook that records the panicking thread's stack while a
/// [`catch_with_stack`] poll is running on it. Other panics only reach the
/// previous hook.
fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if ARMED.with(Cell::get) > 0 {
                let stack = Backtrace::force_capture().to_string();
                PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            }
            previous(info);
        }));
    });
}

struct Armed;

impl Armed {
    fn new() -> Self {
        ARMED.with(|depth| depth.set(depth.get() + 1));
        Armed
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        ARMED.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Drive `fut`, catching a panic together with the stack taken where it
/// was raised.
async fn catch_with_stack<F: Future>(
    fut: F,
) -> Result<F::Output, (Box<dyn Any + Send>, Option<String>)> {
    install_hook();
    let mut fut = pin!(fut);
    let armed = poll_fn(move |cx| {
        let _armed = Armed::new();
        fut.as_mut().poll(cx)
    });

    match AssertUnwindSafe(armed).catch_unwind().await {
        Ok(output) => Ok(output),
        Err(payload) => Err((payload, PANIC_STACK.with(|slot| slot.borrow_mut().take()))),
    }
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
