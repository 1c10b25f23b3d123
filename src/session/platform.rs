use regex::Regex;

const CISCO_PROMPT: &str = r"(?m)^[\w.\-@/:]{1,63}(\(config[\w.\-@/:+]{0,32}\))?[>#]\s*\z";
const IOSXR_PROMPT: &str =
    r"(?m)^(RP/\d+/RS?P\d+/CPU\d+:)?[\w.\-@/:]{1,63}(\(config[\w.\-@/:+]{0,32}\))?[>#]\s*\z";
const JUNOS_PROMPT: &str = r"(?m)^(\{\w+(:\d+)?\}\n)?[\w\-@()/:.]{1,63}[>#%]\s*\z";
const GENERIC_PROMPT: &str = r"(?m)^[\w.\-@/:~\[\] ]{1,63}[>#$%]\s*\z";

/// How to drive the CLI of one network operating system.
#[derive(Debug)]
pub struct PlatformProfile {
    pub name: &'static str,
    prompt: &'static str,
    /// Sent once after login, typically to disable paging.
    pub on_open: &'static [&'static str],
    pub on_close: &'static [&'static str],
    /// Output fragments the device prints when it rejects a command.
    pub failed_when_contains: &'static [&'static str],
}

static PROFILES: &[PlatformProfile] = &[
    PlatformProfile {
        name: "cisco_iosxe",
        prompt: CISCO_PROMPT,
        on_open: &["terminal length 0", "terminal width 512"],
        on_close: &["exit"],
        failed_when_contains: &[
            "% Ambiguous command",
            "% Incomplete command",
            "% Invalid input detected",
            "% Unknown command",
        ],
    },
    PlatformProfile {
        name: "cisco_nxos",
        prompt: CISCO_PROMPT,
        on_open: &["terminal length 0", "terminal width 511"],
        on_close: &["exit"],
        failed_when_contains: &[
            "% Ambiguous command",
            "% Incomplete command",
            "% Invalid command",
            "% Invalid input detected",
            "% Permission denied",
        ],
    },
    PlatformProfile {
        name: "cisco_iosxr",
        prompt: IOSXR_PROMPT,
        on_open: &["terminal length 0", "terminal width 512"],
        on_close: &["exit"],
        failed_when_contains: &[
            "% Ambiguous command",
            "% Incomplete command",
            "% Invalid input detected",
            "% Unknown command",
        ],
    },
    PlatformProfile {
        name: "arista_eos",
        prompt: CISCO_PROMPT,
        on_open: &["terminal length 0", "terminal width 32767"],
        on_close: &["exit"],
        failed_when_contains: &[
            "% Ambiguous command",
            "% Error",
            "% Incomplete command",
            "% Invalid input",
            "% Cannot commit",
            "% Unavailable command",
        ],
    },
    PlatformProfile {
        name: "juniper_junos",
        prompt: JUNOS_PROMPT,
        on_open: &[
            "set cli screen-length 0",
            "set cli screen-width 511",
            "set cli complete-on-space off",
        ],
        on_close: &["exit"],
        failed_when_contains: &[
            "is ambiguous",
            "No valid completions",
            "unknown command",
            "syntax error",
        ],
    },
];

static GENERIC: PlatformProfile = PlatformProfile {
    name: "generic",
    prompt: GENERIC_PROMPT,
    on_open: &[],
    on_close: &["exit"],
    failed_when_contains: &[],
};

impl PlatformProfile {
    pub fn for_platform(platform: &str) -> Option<&'static PlatformProfile> {
        PROFILES
            .iter()
            .find(|profile| profile.name.eq_ignore_ascii_case(platform.trim()))
    }

    pub fn generic() -> &'static PlatformProfile {
        &GENERIC
    }

    /// The prompt pattern, anchored to the end of the received text.
    pub fn prompt(&self) -> Result<Regex, regex::Error> {
        Regex::new(self.prompt)
    }

    pub fn failure(&self, output: &str) -> Option<&'static str> {
        self.failed_when_contains
            .iter()
            .copied()
            .find(|marker| output.contains(marker))
    }
}
