//! Chat control directives.
//!
//! Lines starting with `!` are parsed into a [`Directive`] and applied to
//! the [`Relay`]. Anything else is ignored.

pub mod parser;

pub use parser::{
    format_help, get_command_help, normalize_destination, parse_directive, AddRequest,
    CommandInfo, Directive, PREFIX,
};

use tracing::{debug, warn};

use crate::relay::{Registration, Relay, TimerState};
use crate::RelayError;

/// Apply a chat line to the relay and build the reply.
///
/// `origin` is the destination the line arrived on; directives that take an
/// optional destination fall back to it. Returns None when the line is not
/// a directive or names an unknown one.
pub async fn interpret(relay: &Relay, origin: Option<&str>, text: &str) -> Option<String> {
    let directive = parse_directive(text)?;
    debug!(?origin, ?directive, "Directive received");

    let reply = match directive {
        Directive::Help => format_help(),
        Directive::Status(dest) => status(relay, dest.as_deref().or(origin)).await,
        Directive::Add(request) => add(relay, request).await,
        Directive::Remove(dest) => match dest.as_deref().or(origin) {
            Some(dest) => remove(relay, dest).await,
            None => missing_destination("!remove <destination>"),
        },
        Directive::Pause(dest) => match dest.as_deref().or(origin) {
            Some(dest) => pause(relay, dest).await,
            None => missing_destination("!pause <destination>"),
        },
        Directive::Resume(dest) => match dest.as_deref().or(origin) {
            Some(dest) => resume(relay, dest).await,
            None => missing_destination("!resume <destination>"),
        },
        Directive::List(dest) => list(relay, dest.as_deref().or(origin)).await,
        Directive::Invalid { usage, reason } => {
            format!(":x: Invalid syntax ({reason}). Usage: `{usage}`")
        }
        Directive::Unknown(name) => {
            debug!(name = %name, "Ignoring unknown directive");
            return None;
        }
    };
    Some(reply)
}

fn missing_destination(usage: &str) -> String {
    format!(":x: Which destination? Usage: `{usage}`")
}

fn failure(error: &RelayError) -> String {
    match error {
        RelayError::NotFound(dest) => format!(":x: No feeds are registered in <#{dest}>."),
        RelayError::Config(reason) => format!(":x: {reason}"),
        other => {
            warn!(error = %other, "Directive failed");
            format!(":x: {other}")
        }
    }
}

async fn status(relay: &Relay, dest: Option<&str>) -> String {
    let header = format!(
        "**Feed relay is running** (up {}, {} feed(s) polling)",
        format_uptime(relay.uptime()),
        relay.scheduler().running_count().await
    );
    let Some(dest) = dest else {
        return header;
    };

    let status = relay.status(dest).await;
    let detail = match (status.state, status.registration) {
        (TimerState::Running, Some(reg)) => format!(
            ":white_check_mark: <#{dest}> is polling {} every {}s.",
            reg.source_url, reg.interval_secs
        ),
        _ if status.registrations > 0 => {
            format!(":pause_button: <#{dest}> has {} paused feed(s).", status.registrations)
        }
        _ => format!(":x: No feed is currently being polled in <#{dest}>."),
    };
    format!("{header}\n{detail}")
}

async fn add(relay: &Relay, request: AddRequest) -> String {
    // 0 picks up the configured default in the store
    let interval = request.interval_secs.unwrap_or(0);
    let mut registration = Registration::new(request.source_url, request.destination_id, interval);
    if let Some(credentials) = request.credentials {
        registration = registration.with_credentials(credentials);
    }

    match relay.add(registration).await {
        Ok(stored) => format!(
            ":white_check_mark: Now relaying {} to <#{}> every {}s.",
            stored.source_url, stored.destination_id, stored.interval_secs
        ),
        Err(e) => failure(&e),
    }
}

async fn remove(relay: &Relay, dest: &str) -> String {
    match relay.remove(dest).await {
        Ok(removed) => format!(
            ":wastebasket: Removed {} feed(s) from <#{dest}>.",
            removed.len()
        ),
        Err(e) => failure(&e),
    }
}

async fn pause(relay: &Relay, dest: &str) -> String {
    match relay.pause(dest).await {
        Ok(()) => format!(":pause_button: Paused feeds in <#{dest}>."),
        Err(e) => failure(&e),
    }
}

async fn resume(relay: &Relay, dest: &str) -> String {
    match relay.resume(dest).await {
        Ok(reg) => format!(
            ":arrow_forward: Resumed {} in <#{dest}> every {}s.",
            reg.source_url, reg.interval_secs
        ),
        Err(e) => failure(&e),
    }
}

async fn list(relay: &Relay, dest: Option<&str>) -> String {
    let registrations = relay.list(dest).await;
    if registrations.is_empty() {
        return match dest {
            Some(dest) => format!(":x: No feeds are registered in <#{dest}>."),
            None => ":x: No feeds are registered.".to_string(),
        };
    }

    let mut lines = vec!["**Registered feeds:**".to_string()];
    for (i, reg) in registrations.iter().enumerate() {
        let state = if reg.active { "active" } else { "paused" };
        lines.push(format!(
            "{}. {} -> <#{}> every {}s ({state})",
            i + 1,
            reg.source_url,
            reg.destination_id,
            reg.interval_secs
        ));
    }
    lines.join("\n")
}

/// Format an uptime as `1d 2h 3m 4s`, dropping leading zero units.
pub fn format_uptime(uptime: chrono::Duration) -> String {
    let total = uptime.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        (total % 86_400) / 3_600,
        (total % 3_600) / 60,
        total % 60,
    );
    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
