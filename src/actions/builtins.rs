//! Built-in actions for common development tasks.
//!
//! Registered before any user plugin, so a manifest may override any of
//! these by reusing the name. Every command is spawned with an explicit
//! argument vector; caller-supplied values never pass through a shell.

use tracing::info;

use crate::error::Result;
use crate::shell::{self, script_program};

use super::types::{Action, ActionArgs, ParamKind, ParamSpec, Plugin};

/// Name under which the built-in actions are registered.
pub const BUILTINS_PLUGIN: &str = "builtins";

const DEFAULT_COMMIT_MESSAGE: &str = "Bridge commit";
const DEFAULT_NOTIFICATION: &str = "Hello from Agent Bridge!";

/// Build the built-in plugin.
pub fn builtins_plugin() -> Plugin {
    Plugin::new(BUILTINS_PLUGIN)
        .with_description("Built-in actions for common development tasks")
        .with_action(
            "formatDocument",
            program_action(&script_program("npx"), &["prettier", "--write", "."])
                .with_description("Format the workspace with prettier"),
        )
        .with_action(
            "saveAll",
            Action::from_fn(|_args: ActionArgs| async move {
                Ok("Use Ctrl+K S in VS Code to save all".to_string())
            })
            .with_description("Hint for saving all open editors"),
        )
        .with_action(
            "gitStatus",
            program_action("git", &["status"]).with_description("Show git status"),
        )
        .with_action(
            "gitCommit",
            Action::from_fn(|args: ActionArgs| async move { git_commit(args).await })
                .with_description("Stage everything and commit")
                .with_param(
                    ParamSpec::optional("message", ParamKind::String)
                        .with_default(DEFAULT_COMMIT_MESSAGE),
                ),
        )
        .with_action(
            "npmInstall",
            program_action(&script_program("npm"), &["install"])
                .with_description("Install npm dependencies"),
        )
        .with_action(
            "npmTest",
            program_action(&script_program("npm"), &["test"]).with_description("Run npm test"),
        )
        .with_action(
            "npmBuild",
            program_action(&script_program("npm"), &["run", "build"])
                .with_description("Run the npm build script"),
        )
        .with_action(
            "listFiles",
            Action::from_fn(|args: ActionArgs| async move {
                let dir = args.str_or("dir", ".").to_string();
                shell::run_program("ls", &["-la".to_string(), dir], None, None).await
            })
            .with_description("List a directory")
            .with_param(ParamSpec::optional("dir", ParamKind::String).with_default(".")),
        )
        .with_action(
            "showNotification",
            Action::from_fn(|args: ActionArgs| async move {
                let text = args.str_or("text", DEFAULT_NOTIFICATION).to_string();
                info!(notification = %text, "Notification");
                Ok(text)
            })
            .with_description("Log a notification and echo it back")
            .with_param(
                ParamSpec::optional("text", ParamKind::String).with_default(DEFAULT_NOTIFICATION),
            ),
        )
}

/// An action that always runs the same program with fixed arguments.
fn program_action(program: &str, args: &[&str]) -> Action {
    let program = program.to_string();
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    Action::from_fn(move |_args: ActionArgs| {
        let program = program.clone();
        let args = args.clone();
        async move { shell::run_program(&program, &args, None, None).await }
    })
}

async fn git_commit(args: ActionArgs) -> Result<String> {
    let message = args.str_or("message", DEFAULT_COMMIT_MESSAGE).to_string();
    shell::run_program("git", &["add".to_string(), "-A".to_string()], None, None).await?;
    shell::run_program("git", &["commit".to_string(), "-m".to_string(), message], None, None)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRegistry;

    #[test]
    fn test_builtins_declares_expected_actions() {
        let plugin = builtins_plugin();
        assert_eq!(plugin.name(), BUILTINS_PLUGIN);
        let names: Vec<&str> = plugin.actions().map(|(name, _)| name).collect();
        for expected in [
            "formatDocument",
            "saveAll",
            "gitStatus",
            "gitCommit",
            "npmInstall",
            "npmTest",
            "npmBuild",
            "listFiles",
            "showNotification",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_show_notification_echoes_text() {
        let registry = ActionRegistry::new();
        registry.register(builtins_plugin()).await;

        let args = ActionArgs::new().with("text", "build finished");
        assert_eq!(
            registry.run("showNotification", Some(args)).await.unwrap(),
            "build finished"
        );
        assert_eq!(
            registry.run("showNotification", None).await.unwrap(),
            DEFAULT_NOTIFICATION
        );
    }

    #[tokio::test]
    async fn test_save_all_hint() {
        let registry = ActionRegistry::new();
        registry.register(builtins_plugin()).await;
        assert!(registry
            .run("saveAll", None)
            .await
            .unwrap()
            .contains("save all"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_files_missing_dir_reports_stderr() {
        let registry = ActionRegistry::new();
        registry.register(builtins_plugin()).await;

        let args = ActionArgs::new().with("dir", "/definitely/not/here");
        let err = registry.run("listFiles", Some(args)).await.unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here"));
    }

    #[tokio::test]
    async fn test_git_commit_rejects_non_string_message() {
        let registry = ActionRegistry::new();
        registry.register(builtins_plugin()).await;

        let args = ActionArgs::new().with("message", 42);
        let err = registry.run("gitCommit", Some(args)).await.unwrap_err();
        assert!(matches!(err, crate::error::BridgeError::Validation(_)));
    }
}
