#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands taking one gallery reference (1-based index or image id).
pub(crate) const TARGET_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "select",
        action: "select_for_edit",
    },
    CommandSpec {
        command: "upscale",
        action: "upscale",
    },
    CommandSpec {
        command: "download",
        action: "download",
    },
];

/// Commands whose whole remainder is free text.
pub(crate) const TEXT_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "edit",
    action: "edit",
}];

pub(crate) const PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "open",
    action: "open",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "list",
        action: "list",
    },
    CommandSpec {
        command: "cancel",
        action: "clear_edit_target",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
];

pub const STUDIO_HELP_COMMANDS: &[&str] = &[
    "/list",
    "/select <n|id>",
    "/edit <instruction>",
    "/cancel",
    "/upscale <n|id>",
    "/download <n|id>",
    "/open <path>",
    "/help",
    "/quit",
];
