use std::sync::Arc;

use tokio::{
    sync::{broadcast::error::RecvError, Mutex},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info};

use crate::session::{FormSession, SaveOutcome};

pub struct AutosaveDriver {
    task: JoinHandle<()>,
}

impl AutosaveDriver {
    pub fn spawn(session: Arc<Mutex<FormSession>>) -> Self {
        let task = tokio::spawn(run(session));
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for AutosaveDriver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(session: Arc<Mutex<FormSession>>) {
    let mut events = session.lock().await.subscribe_events();
    loop {
        let deadline = session.lock().await.next_deadline();
        let wait = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = wait => {}
            received = events.recv() => match received {
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("autosave driver: skipped {skipped} session events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        }

        let (job, store) = {
            let mut session = session.lock().await;
            (session.tick(Instant::now()), session.store())
        };
        let Some(job) = job else {
            continue;
        };
        let result = job.run(store.as_ref()).await;
        match session.lock().await.finish_save(result) {
            SaveOutcome::Saved(form_id) => debug!("autosave driver: saved form {form_id}"),
            SaveOutcome::Failed(err) => debug!("autosave driver: save failed: {err}"),
            SaveOutcome::Discarded | SaveOutcome::Skipped(_) => {}
        }
    }
    info!("autosave driver: session closed, stopping");
}

#[cfg(test)]
#[path = "tests/driver_tests.rs"]
mod tests;
