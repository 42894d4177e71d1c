use crate::models::RedirectRequest;
use crate::services::redirect::{ConflictKind, RedirectError, RedirectManager};
use crate::ui::{DecisionProvider, ExecutionSink, Interaction, Prompt, confirm};

/// Offers to force a redirect over whatever blocked it.
///
/// A conflict gets at most one forced retry; a forced request is never
/// escalated again.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    manager: RedirectManager,
}

impl ConflictResolver {
    pub fn new(manager: RedirectManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &RedirectManager {
        &self.manager
    }

    /// Create the redirect, escalating typed conflicts to the user.
    ///
    /// Returns whether the redirect exists afterwards. Failures that cannot
    /// be fixed by forcing are reported as a warning.
    pub fn create_with_recovery(&self, request: &RedirectRequest, io: &Interaction) -> bool {
        match self.manager.create_redirect(request, Some(io.sink)) {
            Ok(()) => true,
            Err(error) => {
                io.message(&failure_message(&error));
                match error.kind() {
                    ConflictKind::Unknown => {
                        report_unknown(&error, io);
                        false
                    }
                    _ => self.resolve_and_retry(
                        &error,
                        request,
                        io.decider,
                        io.show_dialogues,
                        Some(io.sink),
                    ),
                }
            }
        }
    }

    /// Ask whether the obstruction behind `error` may be removed, and if so
    /// retry once with `force`.
    pub fn resolve_and_retry(
        &self,
        error: &RedirectError,
        request: &RedirectRequest,
        decider: &dyn DecisionProvider,
        can_prompt: bool,
        sink: Option<&dyn ExecutionSink>,
    ) -> bool {
        if request.force || !can_prompt {
            return false;
        }

        let Some(prompt) = conflict_prompt(error) else {
            return false;
        };

        if !confirm(decider, &prompt) {
            tracing::info!("Forced redirect declined for {}", request.destination);
            return false;
        }

        match self.manager.create_redirect(&request.forced(), sink) {
            Ok(()) => true,
            Err(retry_error) => {
                tracing::error!("Forced redirect failed: {}", retry_error);
                if let Some(sink) = sink {
                    sink.message(&failure_message(&retry_error));
                }
                false
            }
        }
    }
}

fn failure_message(error: &RedirectError) -> String {
    format!("Failed to create symlink. Error: {error}")
}

fn report_unknown(error: &RedirectError, io: &Interaction) {
    io.reporter.warning(
        "Failed to Create Symlink",
        &format!("Failed to create symlink for {}", std::env::consts::OS),
        &format!("Error: {error}"),
    );
}

fn conflict_prompt(error: &RedirectError) -> Option<Prompt> {
    let (text, information, positive) = match error.kind() {
        ConflictKind::DestinationNonEmptyDirectory => (
            "The symlink destination exists and is a non-empty directory.",
            "Would you like to delete the existing directory and its contents and retry creating the symlink?",
            "Delete Directory and Retry",
        ),
        ConflictKind::DestinationIsFile => (
            "The symlink destination exists and is a file.",
            "Would you like to delete the existing file and retry creating the symlink?",
            "Delete File and Retry",
        ),
        ConflictKind::DestinationParentMissing => (
            "The symlink destination parent directory does not exist.",
            "Would you like to create the parent directory and retry creating the symlink?",
            "Create Parent Directory and Retry",
        ),
        ConflictKind::Unknown => return None,
    };

    Some(
        Prompt::binary("Symlink Creation Failed", text, information, positive)
            .with_details(failure_message(error)),
    )
}
