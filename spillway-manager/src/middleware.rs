//! Handler middleware
//!
//! A handler turns a context and an instruction into a result. Middleware
//! wraps a handler and returns a new one. Middlewares run in the order they
//! are supplied: the first one is outermost, sees the call first and the
//! result last.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use futures::FutureExt;
use futures::future::BoxFuture;
use spillway_core::Instruction;
use tracing::{error, info};

use crate::context::Context;
use crate::error::{PipelineError, Result};

const STATUS_SUCCESS: &str = "success";
const STATUS_FAIL: &str = "fail";

/// A boxed instruction handler
pub type Handler = Arc<dyn Fn(Context, Instruction) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wraps a handler to enhance its capabilities
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Applies the middleware so that it executes in the order provided
pub fn wrap_middleware(handler: Handler, middleware: &[Middleware]) -> Handler {
    // Wrap from the last middleware to the first so the first ends up outermost
    middleware
        .iter()
        .rev()
        .fold(handler, |inner, mw| mw(inner))
}

/// Logs the outcome of every instruction
///
/// Failures are wrapped with the pipeline id before being logged and
/// returned.
pub fn log() -> Middleware {
    Arc::new(|inner: Handler| -> Handler {
        Arc::new(move |ctx: Context, instruction: Instruction| {
            let inner = Arc::clone(&inner);
            async move {
                let id = instruction.id().to_string();
                let operation = instruction.operation;
                let config = instruction.config.clone();
                let request_id = ctx.request_id();

                match inner(ctx, instruction).await {
                    Ok(()) => {
                        info!(
                            pipeline_id = %id,
                            %operation,
                            %request_id,
                            ?config,
                            status = STATUS_SUCCESS,
                            "success - handling instruction for pipeline {}",
                            id
                        );
                        Ok(())
                    }
                    Err(source) => {
                        let err = PipelineError::Handling {
                            id: id.clone(),
                            operation,
                            source: Box::new(source),
                        };
                        error!(
                            pipeline_id = %id,
                            %operation,
                            %request_id,
                            ?config,
                            status = STATUS_FAIL,
                            "fail - {}",
                            err
                        );
                        Err(err)
                    }
                }
            }
            .boxed()
        })
    })
}

/// Stops panics from unwinding past the handler and returns them as errors
///
/// Install this before [`log`] so it is the outermost middleware.
pub fn catch_panic() -> Middleware {
    install_backtrace_hook();

    Arc::new(|inner: Handler| -> Handler {
        Arc::new(move |ctx: Context, instruction: Instruction| {
            let inner = Arc::clone(&inner);
            async move {
                let id = instruction.id().to_string();
                let operation = instruction.operation;
                let request_id = ctx.request_id();

                // Calling the handler inside the future catches panics raised
                // before its first await as well
                let call = async move { inner(ctx, instruction).await };
                match AssertUnwindSafe(call).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        let backtrace = take_panic_backtrace()
                            .unwrap_or_else(|| Backtrace::force_capture().to_string());
                        error!(
                            pipeline_id = %id,
                            %operation,
                            %request_id,
                            status = STATUS_FAIL,
                            "panic occurred: {}: stacktrace:\n{}",
                            message,
                            backtrace
                        );
                        Err(PipelineError::PanicRecovered { message, backtrace })
                    }
                }
            }
            .boxed()
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static BACKTRACE_HOOK: Once = Once::new();

/// Captures the backtrace at the panic site for the panicking thread
///
/// The previous hook still runs, so default panic output is preserved.
fn install_backtrace_hook() {
    BACKTRACE_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_panic_backtrace() -> Option<String> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spillway_core::{ConfigSnapshot, EnvironmentConstants, Operation};
    use std::sync::Mutex;

    fn instruction(id: &str) -> Instruction {
        Instruction {
            operation: Operation::Add,
            config: ConfigSnapshot::new(id),
            constants: Arc::new(EnvironmentConstants {
                consumer_bucket: "artifacts".to_string(),
                consumer_key: "consumer.zip".to_string(),
                consumer_role_arn: "arn:role:consumer".to_string(),
                identifiers_table: "idents".to_string(),
            }),
        }
    }

    fn handler_ok() -> Handler {
        Arc::new(|_ctx: Context, _instruction: Instruction| {
            async { Ok::<(), PipelineError>(()) }.boxed()
        })
    }

    fn handler_err() -> Handler {
        Arc::new(|_ctx: Context, instruction: Instruction| {
            async move {
                Err(PipelineError::NotFound {
                    id: instruction.config.id,
                    table: "idents".to_string(),
                })
            }
            .boxed()
        })
    }

    fn explode() -> Result<()> {
        panic!("consumer exploded")
    }

    fn recording(name: &'static str, trace: Arc<Mutex<Vec<String>>>) -> Middleware {
        Arc::new(move |inner: Handler| -> Handler {
            let trace = Arc::clone(&trace);
            Arc::new(move |ctx: Context, instruction: Instruction| {
                let inner = Arc::clone(&inner);
                let trace = Arc::clone(&trace);
                async move {
                    trace.lock().unwrap().push(format!("{name}-pre"));
                    let result = inner(ctx, instruction).await;
                    trace.lock().unwrap().push(format!("{name}-post"));
                    result
                }
                .boxed()
            })
        })
    }

    #[tokio::test]
    async fn test_middleware_runs_in_declaration_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let handler_trace = Arc::clone(&trace);
        let handler: Handler = Arc::new(move |_ctx: Context, _instruction: Instruction| {
            let trace = Arc::clone(&handler_trace);
            async move {
                trace.lock().unwrap().push("handler".to_string());
                Ok::<(), PipelineError>(())
            }
            .boxed()
        });

        let wrapped = wrap_middleware(
            handler,
            &[
                recording("a", Arc::clone(&trace)),
                recording("b", Arc::clone(&trace)),
            ],
        );
        wrapped(Context::background(), instruction("p1")).await.unwrap();

        assert_eq!(
            *trace.lock().unwrap(),
            vec!["a-pre", "b-pre", "handler", "b-post", "a-post"]
        );
    }

    #[tokio::test]
    async fn test_no_middleware_returns_handler() {
        let wrapped = wrap_middleware(handler_ok(), &[]);
        assert!(wrapped(Context::background(), instruction("p1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_log_passes_success_through() {
        let wrapped = wrap_middleware(handler_ok(), &[log()]);
        assert!(wrapped(Context::background(), instruction("p1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_log_wraps_failure_with_pipeline_id() {
        let wrapped = wrap_middleware(handler_err(), &[log()]);

        let err = wrapped(Context::background(), instruction("p7"))
            .await
            .unwrap_err();

        match &err {
            PipelineError::Handling { id, operation, .. } => {
                assert_eq!(id, "p7");
                assert_eq!(*operation, Operation::Add);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_not_found());
        assert!(
            err.to_string()
                .starts_with("handling instruction for pipeline p7")
        );
    }

    #[tokio::test]
    async fn test_catch_panic_converts_panic_to_error() {
        let panicking: Handler =
            Arc::new(|_ctx: Context, _instruction: Instruction| async { explode() }.boxed());
        let wrapped = wrap_middleware(panicking, &[catch_panic(), log()]);

        let err = wrapped(Context::background(), instruction("p1"))
            .await
            .unwrap_err();

        match err {
            PipelineError::PanicRecovered { message, backtrace } => {
                assert_eq!(message, "consumer exploded");
                assert!(!backtrace.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_catch_panic_covers_synchronous_panic() {
        let panicking: Handler = Arc::new(
            |_ctx: Context, _instruction: Instruction| -> BoxFuture<'static, Result<()>> {
                panic!("before future")
            },
        );
        let wrapped = wrap_middleware(panicking, &[catch_panic()]);

        let err = wrapped(Context::background(), instruction("p1"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::PanicRecovered { .. }));
    }

    #[tokio::test]
    async fn test_catch_panic_leaves_errors_alone() {
        let wrapped = wrap_middleware(handler_err(), &[catch_panic()]);

        let err = wrapped(Context::background(), instruction("p1"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
