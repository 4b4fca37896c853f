use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use longevity_core::prelude::{InterruptHandle, InterruptListener, InterruptedError};

use crate::context::{JourneyContext, UserValuesConstraint};
use crate::lifecycle::{Statement, StatementResult};

#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    interrupt_handle: InterruptHandle,
}

/// How a statement handed to [Executor::run_on_worker] ended.
///
/// When the worker is stopped early its context only comes back if the worker noticed the
/// interrupt within the stop grace. Otherwise the worker is abandoned and `context` is `None`.
pub(crate) enum WorkerOutcome<V: UserValuesConstraint> {
    Finished {
        context: JourneyContext<V>,
        result: StatementResult,
    },
    /// The deadline passed first. `late_result` is whatever the worker returned once it noticed the
    /// interrupt.
    TimedOut {
        context: Option<JourneyContext<V>>,
        late_result: StatementResult,
    },
    /// The run was interrupted while the worker was busy.
    Interrupted {
        context: Option<JourneyContext<V>>,
        result: StatementResult,
    },
}

/// A timeout that only starts counting once `armed` fires.
///
/// If the sending side is dropped without firing, the deadline never passes.
pub(crate) struct Deadline {
    pub(crate) timeout: Duration,
    pub(crate) armed: tokio::sync::oneshot::Receiver<()>,
}

enum Race<T> {
    Finished(Result<T, tokio::sync::oneshot::error::RecvError>),
    DeadlineElapsed,
    Interrupted,
}

impl Executor {
    /// `interrupt_handle` is the run-wide handle. Every wait this executor performs gives up
    /// when it fires.
    pub fn new(runtime: tokio::runtime::Runtime, interrupt_handle: InterruptHandle) -> Self {
        Self {
            runtime,
            interrupt_handle,
        }
    }

    pub fn interrupt_handle(&self) -> &InterruptHandle {
        &self.interrupt_handle
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Note that the future will be cancelled if the run is interrupted. You do not need to do anything
    /// special to handle this, but you should be aware that submitting a future which does not support
    /// cancelling may prevent the runner from shutting down.
    ///
    /// Journey code should prefer [JourneyContext::execute_in_place], which is also cancelled when
    /// the scenario times out.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.execute_until_interrupted(fut, self.interrupt_handle.new_listener())
    }

    pub(crate) fn execute_until_interrupted<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
        mut listener: InterruptListener,
    ) -> anyhow::Result<T> {
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = listener.wait_for_interrupt() => {
                    Err(anyhow::anyhow!(InterruptedError::default()))
                },
            }
        })
    }

    /// Block for `duration`, or until `listener` fires, whichever is first.
    pub fn sleep(
        &self,
        duration: Duration,
        mut listener: InterruptListener,
    ) -> Result<(), InterruptedError> {
        if listener.should_interrupt() {
            return Err(InterruptedError::default());
        }
        if duration.is_zero() {
            return Ok(());
        }

        self.runtime.block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => Ok(()),
                _ = listener.wait_for_interrupt() => Err(InterruptedError::default()),
            }
        })
    }

    /// Evaluate `statement` on a dedicated thread while this thread watches the clock.
    ///
    /// When `deadline` passes, or the run is interrupted, `scenario_interrupt` is fired and this
    /// waits up to `stop_grace` for the worker to give the context back. A worker that is still busy
    /// after that is left to finish on its own. Panics in the statement are caught and returned as
    /// failures.
    pub(crate) fn run_on_worker<V: UserValuesConstraint>(
        &self,
        worker_name: &str,
        statement: Statement<'static, V>,
        mut context: JourneyContext<V>,
        deadline: Option<Deadline>,
        stop_grace: Duration,
        scenario_interrupt: &InterruptHandle,
    ) -> anyhow::Result<WorkerOutcome<V>> {
        let (sender, mut receiver) = tokio::sync::oneshot::channel();

        let name = worker_name.to_string();
        std::thread::Builder::new()
            .name(worker_name.to_string())
            .spawn(move || {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    statement.evaluate(&mut context)
                }))
                .unwrap_or_else(|panic| Err(vec![panic_to_error(panic)]));

                if sender.send((context, result)).is_err() {
                    log::warn!("Journey worker {name} finished after it was abandoned");
                }
            })?;

        let mut run_listener = self.interrupt_handle.new_listener();
        self.runtime.block_on(async move {
            let race = tokio::select! {
                biased;

                finished = &mut receiver => Race::Finished(finished),
                _ = deadline_elapsed(deadline) => Race::DeadlineElapsed,
                _ = run_listener.wait_for_interrupt() => Race::Interrupted,
            };

            let timed_out = match race {
                Race::Finished(returned) => {
                    return returned
                        .map(|(context, result)| WorkerOutcome::Finished { context, result })
                        .map_err(|_| anyhow::anyhow!("Journey worker exited without returning"));
                }
                Race::DeadlineElapsed => true,
                Race::Interrupted => false,
            };

            scenario_interrupt.interrupt();
            log::debug!("Waiting up to {stop_grace:?} for journey worker {worker_name} to stop");
            let (context, result) = match tokio::time::timeout(stop_grace, receiver).await {
                Ok(Ok((context, result))) => (Some(context), result),
                Ok(Err(_)) => anyhow::bail!("Journey worker exited without returning"),
                Err(_) => {
                    log::warn!(
                        "Journey worker {worker_name} did not stop within {stop_grace:?}, abandoning it"
                    );
                    (None, Ok(()))
                }
            };

            Ok(if timed_out {
                WorkerOutcome::TimedOut {
                    context,
                    late_result: result,
                }
            } else {
                WorkerOutcome::Interrupted { context, result }
            })
        })
    }
}

async fn deadline_elapsed(deadline: Option<Deadline>) {
    match deadline {
        Some(Deadline { timeout, armed }) => {
            if armed.await.is_err() {
                return std::future::pending().await;
            }
            tokio::time::sleep(timeout).await
        }
        None => std::future::pending().await,
    }
}

pub(crate) fn panic_to_error(panic: Box<dyn std::any::Any + Send>) -> anyhow::Error {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());

    anyhow::anyhow!("Journey panicked: {message}")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::context::ArgumentContext;

    const GRACE: Duration = Duration::from_secs(5);

    fn executor() -> Arc<Executor> {
        Arc::new(Executor::new(
            tokio::runtime::Runtime::new().unwrap(),
            InterruptHandle::new(),
        ))
    }

    fn context(executor: &Arc<Executor>, interrupt: &InterruptHandle) -> JourneyContext<()> {
        JourneyContext::new(
            "idle_home".to_string(),
            ArgumentContext::new(),
            executor.clone(),
            interrupt.new_listener(),
        )
    }

    /// A deadline that is armed straight away.
    fn deadline(timeout: Duration) -> Option<Deadline> {
        let (arm, armed) = tokio::sync::oneshot::channel();
        arm.send(()).unwrap();
        Some(Deadline { timeout, armed })
    }

    fn pause_for(duration: Duration) -> Statement<'static, ()> {
        Statement::new(move |ctx| {
            ctx.pause(duration)
                .map_err(|e| vec![anyhow::Error::from(e)])
        })
    }

    #[test]
    fn sleep_returns_early_when_interrupted() {
        let executor = executor();
        let handle = executor.interrupt_handle().child();
        let listener = handle.new_listener();

        let trigger = handle.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.interrupt();
        });

        let started = Instant::now();
        let result = executor.sleep(Duration::from_secs(10), listener);

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn finished_worker_hands_back_its_result() {
        let executor = executor();
        let interrupt = executor.interrupt_handle().child();
        let ctx = context(&executor, &interrupt);

        let outcome = executor
            .run_on_worker(
                "worker",
                Statement::new(|_| Err(vec![anyhow::anyhow!("no network")])),
                ctx,
                deadline(Duration::from_secs(10)),
                GRACE,
                &interrupt,
            )
            .unwrap();

        match outcome {
            WorkerOutcome::Finished { context, result } => {
                assert_eq!(context.journey(), "idle_home");
                assert_eq!(result.unwrap_err()[0].to_string(), "no network");
            }
            _ => panic!("Expected the worker to finish"),
        }
        assert!(!interrupt.is_interrupted());
    }

    #[test]
    fn deadline_interrupts_the_worker() {
        let executor = executor();
        let interrupt = executor.interrupt_handle().child();
        let ctx = context(&executor, &interrupt);

        let outcome = executor
            .run_on_worker(
                "worker",
                pause_for(Duration::from_secs(30)),
                ctx,
                deadline(Duration::from_millis(100)),
                GRACE,
                &interrupt,
            )
            .unwrap();

        match outcome {
            WorkerOutcome::TimedOut {
                context,
                late_result,
            } => {
                assert!(context.is_some());
                assert!(late_result.is_err());
            }
            _ => panic!("Expected the worker to time out"),
        }
        assert!(interrupt.is_interrupted());
    }

    #[test]
    fn worker_that_ignores_the_interrupt_is_abandoned() {
        let executor = executor();
        let interrupt = executor.interrupt_handle().child();
        let ctx = context(&executor, &interrupt);

        let started = Instant::now();
        let outcome = executor
            .run_on_worker(
                "worker",
                Statement::new(|_| {
                    std::thread::sleep(Duration::from_secs(8));
                    Ok(())
                }),
                ctx,
                deadline(Duration::from_millis(200)),
                Duration::from_millis(300),
                &interrupt,
            )
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        match outcome {
            WorkerOutcome::TimedOut {
                context,
                late_result,
            } => {
                assert!(context.is_none());
                assert!(late_result.is_ok());
            }
            _ => panic!("Expected the worker to time out"),
        }
    }

    #[test]
    fn deadline_waits_until_it_is_armed() {
        let executor = executor();
        let interrupt = executor.interrupt_handle().child();
        let ctx = context(&executor, &interrupt);

        let (arm, armed) = tokio::sync::oneshot::channel();
        let outcome = executor
            .run_on_worker(
                "worker",
                Statement::new(move |ctx| {
                    ctx.pause(Duration::from_millis(400))
                        .map_err(|e| vec![anyhow::Error::from(e)])?;
                    arm.send(()).unwrap();
                    Ok(())
                }),
                ctx,
                Some(Deadline {
                    timeout: Duration::from_millis(200),
                    armed,
                }),
                GRACE,
                &interrupt,
            )
            .unwrap();

        assert!(matches!(
            outcome,
            WorkerOutcome::Finished { result: Ok(()), .. }
        ));
    }

    #[test]
    fn panics_become_failures() {
        let executor = executor();
        let interrupt = executor.interrupt_handle().child();
        let ctx = context(&executor, &interrupt);

        let outcome = executor
            .run_on_worker(
                "worker",
                Statement::new(|_| panic!("element not found")),
                ctx,
                None,
                GRACE,
                &interrupt,
            )
            .unwrap();

        match outcome {
            WorkerOutcome::Finished { result, .. } => assert_eq!(
                result.unwrap_err()[0].to_string(),
                "Journey panicked: element not found"
            ),
            _ => panic!("Expected the worker to finish"),
        }
    }

    #[test]
    fn run_wide_interrupt_stops_an_unbounded_worker() {
        let executor = executor();
        let interrupt = executor.interrupt_handle().child();
        let ctx = context(&executor, &interrupt);

        let run_handle = executor.interrupt_handle().clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            run_handle.interrupt();
        });

        let outcome = executor
            .run_on_worker(
                "worker",
                pause_for(Duration::from_secs(30)),
                ctx,
                None,
                GRACE,
                &interrupt,
            )
            .unwrap();

        assert!(matches!(
            outcome,
            WorkerOutcome::Interrupted {
                context: Some(_),
                ..
            }
        ));
    }
}
