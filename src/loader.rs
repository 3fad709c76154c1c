//! Startup registration loading.
//!
//! A CSV file lists one feed per row with the columns
//! `source, destination, interval, user, password`. The first row is a
//! header whose cells serve as defaults for blank cells in the rows below.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::feed::validate_source_url;
use crate::relay::{Credentials, Registration};
use crate::{RelayError, Result};

/// Column values of one CSV row, blanks included.
#[derive(Debug, Clone)]
struct Row {
    source: String,
    destination: String,
    interval: String,
    user: String,
    password: String,
}

impl Row {
    fn from_record(record: &csv::StringRecord) -> Self {
        let cell = |i: usize| record.get(i).unwrap_or("").trim().to_string();
        Self {
            source: cell(0),
            destination: cell(1),
            interval: cell(2),
            user: cell(3),
            password: cell(4),
        }
    }

    /// Fill blank cells from the header row.
    fn with_defaults(mut self, defaults: &Row) -> Self {
        let fill = |value: &mut String, default: &str| {
            if value.is_empty() {
                *value = default.to_string();
            }
        };
        fill(&mut self.source, defaults.source.as_str());
        fill(&mut self.destination, defaults.destination.as_str());
        fill(&mut self.user, defaults.user.as_str());
        fill(&mut self.password, defaults.password.as_str());
        if parse_interval(&self.interval) == 0 {
            self.interval = defaults.interval.clone();
        }
        self
    }
}

/// Parse an interval cell; anything unparsable counts as 0 (use the default).
fn parse_interval(raw: &str) -> u64 {
    raw.trim().parse().unwrap_or(0)
}

/// Build one registration from its parts.
///
/// An interval of 0 is left for the store to replace with the configured
/// default. Credentials are only attached when both parts are present.
pub fn build_registration(
    source_url: &str,
    destination_id: &str,
    interval_secs: u64,
    user: &str,
    password: &str,
    block_private_hosts: bool,
) -> Result<Registration> {
    if source_url.is_empty() {
        return Err(RelayError::Config("feed URL is required".to_string()));
    }
    if destination_id.is_empty() {
        return Err(RelayError::Config(format!(
            "destination is required for {source_url}"
        )));
    }
    validate_source_url(source_url, block_private_hosts)?;

    let mut registration = Registration::new(source_url, destination_id, interval_secs);
    if let Some(credentials) = Credentials::from_parts(user, password) {
        registration = registration.with_credentials(credentials);
    }
    Ok(registration)
}

/// Read registrations from CSV text.
pub fn read_csv<R: Read>(input: R, block_private_hosts: bool) -> Result<Vec<Registration>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);

    let mut records = reader.records();
    let defaults = match records.next() {
        Some(record) => Row::from_record(&record.map_err(csv_error)?),
        None => return Ok(Vec::new()),
    };

    let mut registrations = Vec::new();
    for (index, record) in records.enumerate() {
        let record = record.map_err(csv_error)?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let row = Row::from_record(&record).with_defaults(&defaults);
        // header is line 1
        let line = index + 2;
        let registration = build_registration(
            &row.source,
            &row.destination,
            parse_interval(&row.interval),
            &row.user,
            &row.password,
            block_private_hosts,
        )
        .map_err(|e| match e {
            RelayError::Config(msg) => RelayError::Config(format!("line {line}: {msg}")),
            other => other,
        })?;

        debug!(
            line,
            source = %registration.source_url,
            destination = %registration.destination_id,
            "CSV row loaded"
        );
        registrations.push(registration);
    }
    Ok(registrations)
}

/// Read registrations from a CSV file.
pub fn load_csv<P: AsRef<Path>>(path: P, block_private_hosts: bool) -> Result<Vec<Registration>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        RelayError::Config(format!("failed to open {}: {e}", path.display()))
    })?;
    let registrations = read_csv(file, block_private_hosts)?;
    info!(path = %path.display(), count = registrations.len(), "Loaded feeds from CSV");
    Ok(registrations)
}

fn csv_error(e: csv::Error) -> RelayError {
    RelayError::Config(format!("invalid CSV: {e}"))
}
