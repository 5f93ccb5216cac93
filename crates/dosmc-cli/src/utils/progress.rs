use dosmc::engine::progress::{Progress, ProgressCallback, Snapshot};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

#[derive(Clone)]
pub struct CliProgressHandler {
    pb: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0)
            .with_style(Self::spinner_style())
            .with_message("Initializing...");
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.disable_steady_tick();
        pb.finish_and_clear();

        Self {
            pb: Arc::new(Mutex::new(pb)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let pb_clone = self.pb.clone();

        Box::new(move |progress: Progress| {
            let Ok(mut pb_guard) = pb_clone.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::RunStart(snapshot) => {
                    pb_guard.reset();
                    pb_guard.set_style(Self::spinner_style());
                    pb_guard.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                    pb_guard.set_message(Self::describe(&snapshot));
                }
                Progress::Iteration(snapshot) => {
                    pb_guard.set_position(snapshot.iteration);
                    pb_guard.set_message(Self::describe(&snapshot));
                }
                Progress::StageComplete(snapshot) => {
                    pb_guard.println(format!(
                        "  walker {} finished stage {} after {} iterations (flatness {:.3})",
                        snapshot.walker,
                        snapshot.stage + 1,
                        snapshot.iteration,
                        snapshot.flatness
                    ));
                }
                Progress::RunFinish(snapshot) => {
                    pb_guard.disable_steady_tick();
                    pb_guard.set_position(snapshot.iteration);
                    pb_guard.finish_with_message("✓ Done");
                }
                Progress::Message(msg) => {
                    if !pb_guard.is_finished() {
                        pb_guard.println(format!("  {}", msg));
                    } else {
                        pb_guard.set_message(msg);
                    }
                }
            }
        })
    }

    fn describe(snapshot: &Snapshot) -> String {
        format!(
            "walker {} | stage {} | iteration {} | ln f {:.2e} | flatness {:.3}",
            snapshot.walker,
            snapshot.stage + 1,
            snapshot.iteration,
            snapshot.scale_factor,
            snapshot.flatness
        )
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .expect("Failed to create spinner style template")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
