//! Bridge from I/O tasks to the single-threaded server loop.
//!
//! Jobs travel over a channel to a dedicated thread; the submitting task
//! awaits the reply on a oneshot. A connection therefore does not read its
//! next message until the main thread has answered the current one.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::mpsc,
    thread::{self, JoinHandle, ThreadId},
};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error};

pub const MAIN_THREAD_NAME: &str = "server-main";

type Job = Box<dyn FnOnce() + Send>;

enum Command {
    Run(Job),
    Stop,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("main thread is not running")]
    Stopped,
    #[error("job panicked on the main thread")]
    Panicked,
}

#[derive(Debug, Clone)]
pub struct MainThreadHandle {
    commands: mpsc::Sender<Command>,
    thread_id: ThreadId,
}

impl MainThreadHandle {
    /// Queues `job` on the main thread. The returned future resolves with the
    /// job's value once it has run.
    pub fn submit<T, F>(
        &self,
        job: F,
    ) -> impl std::future::Future<Output = Result<T, ExecutorError>> + Send + 'static
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let queued = self.commands.send(Command::Run(Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(job)).map_err(|_| ExecutorError::Panicked);
            let _ = reply.send(outcome);
        })));

        async move {
            queued.map_err(|_| ExecutorError::Stopped)?;
            receiver.await.map_err(|_| ExecutorError::Stopped)?
        }
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

/// Owner of the main thread.
#[derive(Debug)]
pub struct MainThread {
    handle: MainThreadHandle,
    thread: Option<JoinHandle<()>>,
}

impl MainThread {
    pub fn spawn() -> std::io::Result<Self> {
        let (commands, inbox) = mpsc::channel::<Command>();
        let thread = thread::Builder::new()
            .name(MAIN_THREAD_NAME.to_string())
            .spawn(move || {
                debug!("main thread started");
                while let Ok(command) = inbox.recv() {
                    match command {
                        Command::Run(job) => job(),
                        Command::Stop => break,
                    }
                }
                debug!("main thread stopped");
            })?;

        Ok(Self {
            handle: MainThreadHandle {
                commands,
                thread_id: thread.thread().id(),
            },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> MainThreadHandle {
        self.handle.clone()
    }

    /// Runs the jobs queued so far, then stops the thread. Jobs submitted
    /// afterwards fail with [`ExecutorError::Stopped`].
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.handle.commands.send(Command::Stop);
        if thread.join().is_err() {
            error!("main thread exited with a panic");
        }
    }
}

impl Drop for MainThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn job_runs_on_named_thread() {
        let main = MainThread::spawn().expect("spawn main thread");
        let handle = main.handle();

        let name = handle
            .submit(|| thread::current().name().map(str::to_string))
            .await
            .expect("job result");

        assert_eq!(name.as_deref(), Some(MAIN_THREAD_NAME));
        assert!(!handle.is_main_thread());
    }

    #[tokio::test]
    async fn panic_is_reported_not_propagated() {
        let main = MainThread::spawn().expect("spawn main thread");
        let handle = main.handle();

        let outcome = handle.submit(|| -> u32 { panic!("boom") }).await;
        assert_eq!(outcome, Err(ExecutorError::Panicked));

        let after = handle.submit(|| 5).await;
        assert_eq!(after, Ok(5));
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails() {
        let main = MainThread::spawn().expect("spawn main thread");
        let handle = main.handle();
        main.shutdown();

        assert_eq!(handle.submit(|| 1).await, Err(ExecutorError::Stopped));
    }
}
