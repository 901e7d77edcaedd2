//! Built-in command plugins.

use crate::{CommandDefinition, CommandPlugin, TargetKind};

/// Everyday read-only commands: launch an app, find a file, system info.
pub struct CorePlugin;

impl CommandPlugin for CorePlugin {
    fn name(&self) -> &str {
        "core"
    }

    fn commands(&self) -> Vec<CommandDefinition> {
        vec![
            CommandDefinition::new("open", "open <app_alias>", "open").min_args(1),
            CommandDefinition::new("search", "search file <query>", "search")
                .min_args(2)
                .first_arg("file"),
            CommandDefinition::new("sys", "sys info", "sys")
                .min_args(1)
                .max_args(1)
                .first_arg("info"),
        ]
    }
}

/// Commands that mutate the machine.  All of them are dangerous.
pub struct SystemActionsPlugin;

impl CommandPlugin for SystemActionsPlugin {
    fn name(&self) -> &str {
        "system-actions"
    }

    fn commands(&self) -> Vec<CommandDefinition> {
        vec![
            CommandDefinition::new("delete", "delete <path>", "delete")
                .min_args(1)
                .dangerous(TargetKind::Path),
            CommandDefinition::new("kill", "kill <process_name_or_pid>", "kill")
                .min_args(1)
                .dangerous(TargetKind::Process),
            CommandDefinition::new("shutdown", "shutdown", "shutdown")
                .max_args(0)
                .dangerous(TargetKind::None),
        ]
    }
}

/// Assistant commands: explanations, profile switching, direct capability
/// calls and mapped multi-step system plans.
pub struct AssistPlugin;

impl CommandPlugin for AssistPlugin {
    fn name(&self) -> &str {
        "assist"
    }

    fn commands(&self) -> Vec<CommandDefinition> {
        vec![
            CommandDefinition::new("explain", "explain <command>", "explain"),
            CommandDefinition::new("profile", "profile <strict|balanced|power|explain-only>", "profile")
                .max_args(1),
            CommandDefinition::new("capability", "capability <domain> <action> [args]", "capability")
                .min_args(2),
            CommandDefinition::new("smart", "smart <request>", "smart").min_args(1),
        ]
    }
}

/// The static plugin list used when the host does not supply its own.
pub fn default_plugins() -> Vec<Box<dyn CommandPlugin>> {
    vec![
        Box::new(CorePlugin),
        Box::new(SystemActionsPlugin),
        Box::new(AssistPlugin),
    ]
}
