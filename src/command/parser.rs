//! Control directive parser.
//!
//! Directives start with `!` and take whitespace-separated positional
//! arguments, e.g. `!add https://example.com/feed.xml 1234 300`.

use crate::relay::Credentials;

/// Directive prefix.
pub const PREFIX: char = '!';

/// Arguments of `!add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    /// Feed URL.
    pub source_url: String,
    /// Destination to relay into.
    pub destination_id: String,
    /// Requested interval; None means the configured default.
    pub interval_secs: Option<u64>,
    /// Basic auth for the feed.
    pub credentials: Option<Credentials>,
}

/// A parsed control directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Show the command listing.
    Help,
    /// Report engine and timer state.
    Status(Option<String>),
    /// Register a feed.
    Add(AddRequest),
    /// Remove a destination's feeds.
    Remove(Option<String>),
    /// Stop polling a destination.
    Pause(Option<String>),
    /// Restart polling a destination.
    Resume(Option<String>),
    /// Show registrations.
    List(Option<String>),
    /// A known directive with malformed arguments.
    Invalid {
        /// Usage line of the directive.
        usage: &'static str,
        /// What was wrong.
        reason: String,
    },
    /// Not a directive this relay knows.
    Unknown(String),
}

/// Help entry for one directive.
pub struct CommandInfo {
    /// Directive name.
    pub name: &'static str,
    /// Directive aliases.
    pub aliases: &'static [&'static str],
    /// Usage line.
    pub syntax: &'static str,
    /// What it does.
    pub description: &'static str,
}

const HELP: CommandInfo = CommandInfo {
    name: "help",
    aliases: &[],
    syntax: "!help",
    description: "Display this message",
};

const STATUS: CommandInfo = CommandInfo {
    name: "status",
    aliases: &[],
    syntax: "!status [destination]",
    description: "Check that the relay is running and whether a feed is being polled here",
};

const ADD: CommandInfo = CommandInfo {
    name: "add",
    aliases: &[],
    syntax: "!add <url> <destination> [interval] [user] [pass]",
    description: "Relay a feed into a destination, polling every [interval] seconds",
};

const REMOVE: CommandInfo = CommandInfo {
    name: "remove",
    aliases: &["rm", "delete"],
    syntax: "!remove [destination]",
    description: "Stop and forget every feed of a destination",
};

const PAUSE: CommandInfo = CommandInfo {
    name: "pause",
    aliases: &[],
    syntax: "!pause [destination]",
    description: "Stop polling a destination but keep its feeds",
};

const RESUME: CommandInfo = CommandInfo {
    name: "resume",
    aliases: &[],
    syntax: "!resume [destination]",
    description: "Resume polling a paused destination",
};

const LIST: CommandInfo = CommandInfo {
    name: "list",
    aliases: &["ls"],
    syntax: "!list [destination]",
    description: "List registered feeds",
};

/// Every directive, in help order.
pub fn get_command_help() -> [&'static CommandInfo; 7] {
    [&HELP, &STATUS, &ADD, &REMOVE, &PAUSE, &RESUME, &LIST]
}

/// Format the help reply.
pub fn format_help() -> String {
    let mut lines = vec!["**Commands:**".to_string()];
    for info in get_command_help() {
        let mut line = format!("`{}` - {}", info.syntax, info.description);
        if !info.aliases.is_empty() {
            line.push_str(&format!(" (also `!{}`)", info.aliases.join("`, `!")));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Accept `<#1234>` channel mentions as well as bare IDs.
pub fn normalize_destination(raw: &str) -> String {
    raw.strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(raw)
        .to_string()
}

/// Parse a line. Returns None for text that is not a directive.
pub fn parse_directive(input: &str) -> Option<Directive> {
    let body = input.trim().strip_prefix(PREFIX)?;
    let mut words = body.split_whitespace();
    let name = words.next()?.to_lowercase();
    let args: Vec<&str> = words.collect();

    let directive = match name.as_str() {
        "help" => Directive::Help,
        "status" => optional_destination(&STATUS, &args, Directive::Status),
        "add" => parse_add(&args),
        "remove" | "rm" | "delete" => optional_destination(&REMOVE, &args, Directive::Remove),
        "pause" => optional_destination(&PAUSE, &args, Directive::Pause),
        "resume" => optional_destination(&RESUME, &args, Directive::Resume),
        "list" | "ls" => optional_destination(&LIST, &args, Directive::List),
        _ => Directive::Unknown(name),
    };
    Some(directive)
}

fn optional_destination(
    info: &'static CommandInfo,
    args: &[&str],
    build: fn(Option<String>) -> Directive,
) -> Directive {
    match args {
        [] => build(None),
        [destination] => build(Some(normalize_destination(destination))),
        _ => Directive::Invalid {
            usage: info.syntax,
            reason: format!("expected at most one argument, got {}", args.len()),
        },
    }
}

fn parse_add(args: &[&str]) -> Directive {
    let invalid = |reason: String| Directive::Invalid {
        usage: ADD.syntax,
        reason,
    };

    let (source, destination, rest) = match args {
        [source, destination, rest @ ..] => (*source, *destination, rest),
        _ => return invalid("a feed URL and a destination are required".to_string()),
    };
    if rest.len() > 3 {
        return invalid(format!("expected at most 5 arguments, got {}", args.len()));
    }

    let interval_secs = match rest.first() {
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) => Some(secs),
            Err(_) => return invalid(format!("interval must be a number of seconds, got {raw}")),
        },
        None => None,
    };

    let credentials = match (rest.get(1), rest.get(2)) {
        (None, _) => None,
        (Some(_), None) => return invalid("a password is required with a user".to_string()),
        (Some(user), Some(pass)) => Some(Credentials::new(*user, *pass)),
    };

    Directive::Add(AddRequest {
        source_url: source.to_string(),
        destination_id: normalize_destination(destination),
        interval_secs,
        credentials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_directive() {
        assert_eq!(parse_directive("hello there"), None);
        assert_eq!(parse_directive(""), None);
        assert_eq!(parse_directive("!"), None);
    }

    #[test]
    fn test_parse_help_case_insensitive() {
        assert_eq!(parse_directive("!help"), Some(Directive::Help));
        assert_eq!(parse_directive("  !HELP  "), Some(Directive::Help));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_directive("!status"), Some(Directive::Status(None)));
        assert_eq!(
            parse_directive("!status <#1234>"),
            Some(Directive::Status(Some("1234".to_string())))
        );
    }

    #[test]
    fn test_parse_add_minimal() {
        assert_eq!(
            parse_directive("!add https://example.com/feed.xml chan1"),
            Some(Directive::Add(AddRequest {
                source_url: "https://example.com/feed.xml".to_string(),
                destination_id: "chan1".to_string(),
                interval_secs: None,
                credentials: None,
            }))
        );
    }

    #[test]
    fn test_parse_add_full() {
        assert_eq!(
            parse_directive("!add https://example.com/feed.xml <#99> 300 alice secret"),
            Some(Directive::Add(AddRequest {
                source_url: "https://example.com/feed.xml".to_string(),
                destination_id: "99".to_string(),
                interval_secs: Some(300),
                credentials: Some(Credentials::new("alice", "secret")),
            }))
        );
    }

    #[test]
    fn test_parse_add_errors() {
        for line in [
            "!add",
            "!add https://example.com/feed.xml",
            "!add https://example.com/feed.xml chan1 soon",
            "!add https://example.com/feed.xml chan1 60 alice",
            "!add https://example.com/feed.xml chan1 60 alice secret extra",
        ] {
            assert!(
                matches!(
                    parse_directive(line),
                    Some(Directive::Invalid { usage, .. }) if usage == ADD.syntax
                ),
                "{line} should be invalid"
            );
        }
    }

    #[test]
    fn test_parse_destination_directives() {
        assert_eq!(parse_directive("!pause"), Some(Directive::Pause(None)));
        assert_eq!(
            parse_directive("!resume chan1"),
            Some(Directive::Resume(Some("chan1".to_string())))
        );
        assert_eq!(
            parse_directive("!rm chan1"),
            Some(Directive::Remove(Some("chan1".to_string())))
        );
        assert_eq!(parse_directive("!ls"), Some(Directive::List(None)));
        assert!(matches!(
            parse_directive("!pause a b"),
            Some(Directive::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            parse_directive("!dance now"),
            Some(Directive::Unknown("dance".to_string()))
        );
    }

    #[test]
    fn test_normalize_destination() {
        assert_eq!(normalize_destination("<#1234>"), "1234");
        assert_eq!(normalize_destination("1234"), "1234");
        assert_eq!(normalize_destination("<#1234"), "<#1234");
    }

    #[test]
    fn test_format_help() {
        let help = format_help();
        for info in get_command_help() {
            assert!(help.contains(info.syntax), "missing {}", info.name);
        }
        assert!(help.contains("`!rm`"));
    }
}
