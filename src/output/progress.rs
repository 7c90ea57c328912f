//! Live per-run progress lines

use tokio::sync::watch;

use crate::models::BatchRunState;

/// Emit one `[completed/total] run` line per settled run until the batch
/// stops running or the sender goes away.
pub async fn follow_progress<F>(mut rx: watch::Receiver<BatchRunState>, mut emit: F)
where
    F: FnMut(String),
{
    let mut printed = 0;
    while rx.changed().await.is_ok() {
        let (lines, finished): (Vec<String>, bool) = {
            let state = rx.borrow_and_update();
            if state.results.len() < printed {
                printed = 0;
            }
            let lines = state.results[printed..]
                .iter()
                .map(|r| format!("[{}/{}] {}", state.completed_runs, state.total_runs, r))
                .collect();
            printed = state.results.len();
            (lines, !state.is_running)
        };

        for line in lines {
            emit(line);
        }
        if finished {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::BatchRunner;
    use crate::models::{BatchRunConfig, TestCase};
    use crate::responder::EchoResponder;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_follower_sees_final_runs_and_stops() {
        let runner = BatchRunner::new(Arc::new(EchoResponder::new()));
        let lines = Arc::new(Mutex::new(Vec::new()));

        let follower = {
            let lines = lines.clone();
            tokio::spawn(follow_progress(runner.subscribe(), move |line| {
                lines.lock().unwrap().push(line)
            }))
        };

        let config = BatchRunConfig::new("echo", "m", TestCase::new("t", "hi")).with_runs(3);
        runner.run_batch(config).await.unwrap();

        // Finishes on its own once the finished state is published.
        follower.await.unwrap();

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("[3/3]"));
        assert!(lines[2].contains("Run 3"));
    }

    #[tokio::test]
    async fn test_follower_ends_when_sender_dropped() {
        let (tx, rx) = watch::channel(BatchRunState::default());
        let follower = tokio::spawn(follow_progress(rx, |_| {}));
        drop(tx);
        follower.await.unwrap();
    }
}
