use crate::models::InstallationState;
use crate::services::installer::on_helper_not_found;
use crate::services::removal::remove_tree;
use crate::state::{StateChange, StateManager};
use crate::ui::Interaction;

/// Clears the helper's local depot cache.
///
/// A stale cache is a known cause of failed or stuck downloads.
pub struct DepotCacheManager<'a> {
    state: &'a InstallationState,
    events: &'a StateManager,
}

impl<'a> DepotCacheManager<'a> {
    pub fn new(state: &'a InstallationState, events: &'a StateManager) -> Self {
        Self { state, events }
    }

    /// Remove the cache directory. Returns whether anything was removed.
    pub fn clear(&self, io: &Interaction) -> bool {
        self.clear_with(io, true)
    }

    /// Same as [`clear`](Self::clear), but outcomes go to the execution sink
    /// only. Used at the start of a download batch.
    pub fn clear_before_batch(&self, io: &Interaction) -> bool {
        self.clear_with(io, false)
    }

    fn clear_with(&self, io: &Interaction, notify: bool) -> bool {
        tracing::info!("Attempting steamCMD depot cache clear");

        if !self.state.is_ready {
            io.message("Tried clearing depot cache but SteamCMD was not found. Please setup SteamCMD first!");
            on_helper_not_found(&self.state.prefix_path, io, self.events, false);
            return false;
        }

        let cache = &self.state.cache_path;
        if !cache.exists() {
            io.message(&format!("Skipping depot cache clear. Could not find cache: {cache}"));
            if notify {
                io.reporter
                    .information("Depot Cache Cleared", "SteamCMD depot cache was already cleared.");
            }
            return false;
        }

        match remove_tree(cache) {
            Ok(()) => {
                io.message("Depot cache cleared");
                if notify {
                    io.reporter
                        .information("Depot Cache Cleared", "SteamCMD depot cache has been cleared.");
                }
                self.events.publish(StateChange::DepotCacheCleared);
                true
            }
            Err(e) => {
                io.message(&format!("Failed to clear depot cache: {e}"));
                if notify {
                    io.reporter.warning(
                        "Failed to clear depot cache",
                        "SteamCMD depot cache could not be removed.",
                        &format!("Path: {cache}\nError: {e}"),
                    );
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InstallPhase, Platform};
    use crate::ui::{ExecutionSink, MockReporter, NonInteractive};
    use camino::{Utf8Path, Utf8PathBuf};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct QuietSink {
        closed: Mutex<bool>,
    }

    impl ExecutionSink for QuietSink {
        fn message(&self, _text: &str) {}

        fn execute(&self, _program: &Utf8Path, _args: &[String], _expected_units: usize) -> Option<i32> {
            Some(0)
        }

        fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn ready_state() -> (TempDir, InstallationState) {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let mut state = InstallationState::new(root, Platform::Linux, false);
        state.is_ready = true;
        state.phase = InstallPhase::Linked;
        (temp_dir, state)
    }

    #[test]
    fn test_absent_cache_reports_already_cleared() {
        let (_guard, state) = ready_state();
        let events = StateManager::new();

        let mut reporter = MockReporter::new();
        reporter
            .expect_information()
            .withf(|_, message| message.contains("already cleared"))
            .times(1)
            .return_const(());

        let sink = QuietSink::default();
        let io = Interaction::new(&sink, &NonInteractive, &reporter);

        assert!(!DepotCacheManager::new(&state, &events).clear(&io));
        assert!(!state.cache_path.exists());
    }

    #[test]
    fn test_clear_removes_cache_tree() {
        let (_guard, state) = ready_state();
        fs::create_dir_all(state.cache_path.join("nested")).unwrap();
        fs::write(state.cache_path.join("nested/123_456.manifest"), "m").unwrap();

        let events = StateManager::new();
        let mut rx = events.subscribe();

        let mut reporter = MockReporter::new();
        reporter.expect_information().times(1).return_const(());

        let sink = QuietSink::default();
        let io = Interaction::new(&sink, &NonInteractive, &reporter);

        assert!(DepotCacheManager::new(&state, &events).clear(&io));
        assert!(!state.cache_path.exists());
        assert_eq!(rx.try_recv().unwrap(), StateChange::DepotCacheCleared);
    }

    #[test]
    fn test_batch_clear_reports_to_sink_only() {
        let (_guard, state) = ready_state();
        let events = StateManager::new();

        let mut reporter = MockReporter::new();
        reporter.expect_information().times(0);
        reporter.expect_warning().times(0);

        let sink = QuietSink::default();
        let io = Interaction::new(&sink, &NonInteractive, &reporter);
        let manager = DepotCacheManager::new(&state, &events);

        // Absent cache
        assert!(!manager.clear_before_batch(&io));

        fs::create_dir_all(state.cache_path.join("depot")).unwrap();
        assert!(manager.clear_before_batch(&io));
        assert!(!state.cache_path.exists());
    }

    #[test]
    fn test_not_ready_triggers_setup_prompt() {
        let (_guard, mut state) = ready_state();
        state.is_ready = false;
        fs::create_dir_all(&state.cache_path).unwrap();

        let events = StateManager::new();
        let mut decider = crate::ui::MockDecisionProvider::new();
        decider
            .expect_ask()
            .withf(|prompt| prompt.title == "SteamCMD setup")
            .times(1)
            .returning(|prompt| prompt.negative().to_string());

        let mut reporter = MockReporter::new();
        reporter.expect_information().times(0);

        let sink = QuietSink::default();
        let io = Interaction::new(&sink, &decider, &reporter);

        assert!(!DepotCacheManager::new(&state, &events).clear(&io));
        assert!(state.cache_path.exists());
        assert!(*sink.closed.lock().unwrap());
    }
}
