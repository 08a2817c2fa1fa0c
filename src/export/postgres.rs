use super::sinks::DatabaseSink;
use crate::parse::{ExtraInfoDescriptor, NetworkStatusDocument, RouterStatusEntry, ServerDescriptor};
use anyhow::{Context, Result as AnyhowResult};
use chrono::NaiveDateTime;
use log::{error, info};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Transaction};

/// Upper bound on rows per `INSERT`, keeping the parameter count well below
/// PostgreSQL's limit of 65535 for every table.
const BATCH_SIZE: usize = 1000;

type SqlParam<'a> = &'a (dyn ToSql + Sync);

/// Widths of the fixed-size columns.
const NICKNAME_WIDTH: usize = 19;
const ADDRESS_WIDTH: usize = 15;
const HEX_ID_WIDTH: usize = 40;
const UNBOUNDED: usize = usize::MAX;

/// Returns the first column whose value PostgreSQL would reject: longer than its width,
/// or holding a NUL character. `None` values always fit.
fn misfit<'a>(columns: &[(&'a str, Option<&str>, usize)]) -> Option<&'a str> {
    columns
        .iter()
        .find(|(_, value, width)| {
            value.is_some_and(|v| v.contains('\0') || v.chars().count() > *width)
        })
        .map(|(column, _, _)| *column)
}

/// A buffered row of one table.
trait Row {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    /// Values in the order of [`Row::COLUMNS`].
    fn params(&self) -> Vec<SqlParam<'_>>;
}

#[derive(Debug, Clone)]
struct ConsensusRow {
    valid_after: NaiveDateTime,
    dir_sources: String,
}

impl Row for ConsensusRow {
    const TABLE: &'static str = "consensus";
    const COLUMNS: &'static [&'static str] = &["validafter", "dirsources"];

    fn params(&self) -> Vec<SqlParam<'_>> {
        vec![&self.valid_after, &self.dir_sources]
    }
}

#[derive(Debug, Clone)]
struct VoteRow {
    valid_after: NaiveDateTime,
    dir_source: String,
    digest: Option<String>,
}

impl Row for VoteRow {
    const TABLE: &'static str = "vote";
    const COLUMNS: &'static [&'static str] = &["validafter", "dirsource", "digest"];

    fn params(&self) -> Vec<SqlParam<'_>> {
        vec![&self.valid_after, &self.dir_source, &self.digest]
    }
}

#[derive(Debug, Clone)]
struct StatusEntryRow {
    valid_after: NaiveDateTime,
    nickname: String,
    fingerprint: String,
    descriptor: String,
    published: NaiveDateTime,
    address: String,
    or_port: i32,
    dir_port: i32,
    flags: String,
    version: Option<String>,
    bandwidth: Option<i64>,
    ports: Option<String>,
    raw: String,
}

impl Row for StatusEntryRow {
    const TABLE: &'static str = "statusentry";
    const COLUMNS: &'static [&'static str] = &[
        "validafter",
        "nickname",
        "fingerprint",
        "descriptor",
        "published",
        "address",
        "orport",
        "dirport",
        "flags",
        "version",
        "bandwidth",
        "ports",
        "rawdesc",
    ];

    fn params(&self) -> Vec<SqlParam<'_>> {
        vec![
            &self.valid_after,
            &self.nickname,
            &self.fingerprint,
            &self.descriptor,
            &self.published,
            &self.address,
            &self.or_port,
            &self.dir_port,
            &self.flags,
            &self.version,
            &self.bandwidth,
            &self.ports,
            &self.raw,
        ]
    }
}

#[derive(Debug, Clone)]
struct DescriptorRow {
    digest: String,
    nickname: String,
    address: String,
    or_port: i32,
    dir_port: i32,
    fingerprint: Option<String>,
    bandwidth_avg: Option<i64>,
    bandwidth_burst: Option<i64>,
    bandwidth_observed: Option<i64>,
    platform: Option<String>,
    published: NaiveDateTime,
    uptime: Option<i64>,
    extra_info: Option<String>,
}

impl Row for DescriptorRow {
    const TABLE: &'static str = "descriptor";
    const COLUMNS: &'static [&'static str] = &[
        "descriptor",
        "nickname",
        "address",
        "orport",
        "dirport",
        "fingerprint",
        "bandwidthavg",
        "bandwidthburst",
        "bandwidthobserved",
        "platform",
        "published",
        "uptime",
        "extrainfo",
    ];

    fn params(&self) -> Vec<SqlParam<'_>> {
        vec![
            &self.digest,
            &self.nickname,
            &self.address,
            &self.or_port,
            &self.dir_port,
            &self.fingerprint,
            &self.bandwidth_avg,
            &self.bandwidth_burst,
            &self.bandwidth_observed,
            &self.platform,
            &self.published,
            &self.uptime,
            &self.extra_info,
        ]
    }
}

#[derive(Debug, Clone)]
struct ExtraInfoRow {
    digest: String,
    nickname: String,
    fingerprint: String,
    published: NaiveDateTime,
}

impl Row for ExtraInfoRow {
    const TABLE: &'static str = "extrainfo";
    const COLUMNS: &'static [&'static str] = &["extrainfo", "nickname", "fingerprint", "published"];

    fn params(&self) -> Vec<SqlParam<'_>> {
        vec![&self.digest, &self.nickname, &self.fingerprint, &self.published]
    }
}

#[derive(Debug, Clone)]
struct HistoryRow {
    fingerprint: String,
    history: &'static str,
    interval_end: NaiveDateTime,
    value: i64,
}

impl Row for HistoryRow {
    const TABLE: &'static str = "bwhist";
    const COLUMNS: &'static [&'static str] = &["fingerprint", "history", "intervalend", "value"];

    fn params(&self) -> Vec<SqlParam<'_>> {
        vec![&self.fingerprint, &self.history, &self.interval_end, &self.value]
    }
}

/// Buffers decoded descriptors and imports them into PostgreSQL.
///
/// Parsing is synchronous, so records are collected in memory as the parser hands them
/// over, and [`PostgresImporter::export`] writes them all at the end of the run.
#[derive(Debug, Default)]
pub struct PostgresImporter {
    consensuses: Vec<ConsensusRow>,
    votes: Vec<VoteRow>,
    entries: Vec<StatusEntryRow>,
    descriptors: Vec<DescriptorRow>,
    extra_infos: Vec<ExtraInfoRow>,
    histories: Vec<HistoryRow>,
}

impl PostgresImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered rows across all tables.
    pub fn pending(&self) -> usize {
        self.consensuses.len()
            + self.votes.len()
            + self.entries.len()
            + self.descriptors.len()
            + self.extra_infos.len()
            + self.histories.len()
    }

    /// Exports the buffered records to a PostgreSQL database.
    ///
    /// Connects to the database, creates the tables if they don't exist, and inserts all
    /// buffered rows within a single transaction. Rows that already exist are left
    /// untouched. Optionally truncates the tables first if `clear` is set.
    ///
    /// # Arguments
    ///
    /// * `db_params` - PostgreSQL connection string (e.g., "host=localhost user=postgres password=example").
    /// * `clear` - If `true`, truncates existing tables before inserting new data.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Data successfully exported.
    /// * `Err(anyhow::Error)` - Connection, transaction, or query execution failed.
    pub async fn export(&self, db_params: &str, clear: bool) -> AnyhowResult<()> {
        let (mut client, connection) = tokio_postgres::connect(db_params, NoTls)
            .await
            .context("Failed to connect to PostgreSQL")?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Database connection error: {}", e);
            }
        });

        let transaction = client
            .transaction()
            .await
            .context("Failed to start transaction")?;

        create_tables(&transaction)
            .await
            .context("Failed to create tables")?;

        if clear {
            for table in TABLES {
                transaction
                    .execute(format!("TRUNCATE TABLE {} CASCADE", table).as_str(), &[])
                    .await
                    .with_context(|| format!("Failed to truncate {}", table))?;
            }
        }

        insert_batched(&transaction, &self.consensuses).await?;
        insert_batched(&transaction, &self.votes).await?;
        insert_batched(&transaction, &self.entries).await?;
        insert_batched(&transaction, &self.descriptors).await?;
        insert_batched(&transaction, &self.extra_infos).await?;
        insert_batched(&transaction, &self.histories).await?;

        transaction
            .commit()
            .await
            .context("Failed to commit transaction")?;

        info!("Exported {} rows to PostgreSQL", self.pending());
        Ok(())
    }
}

impl DatabaseSink for PostgresImporter {
    fn add_consensus(&mut self, consensus: &NetworkStatusDocument) {
        self.consensuses.push(ConsensusRow {
            valid_after: consensus.valid_after,
            dir_sources: consensus
                .dir_sources
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(","),
        });
    }

    fn add_vote(&mut self, vote: &NetworkStatusDocument) {
        let Some(authority) = vote.authority() else {
            return;
        };
        if let Some(column) = misfit(&[
            ("dirsource", Some(authority), HEX_ID_WIDTH),
            ("digest", vote.digest.as_deref(), HEX_ID_WIDTH),
        ]) {
            error!(
                "Not importing vote of {} valid after {}: {} does not fit its column",
                authority, vote.valid_after, column
            );
            return;
        }
        self.votes.push(VoteRow {
            valid_after: vote.valid_after,
            dir_source: authority.to_string(),
            digest: vote.digest.clone(),
        });
    }

    fn add_status_entry(&mut self, valid_after: NaiveDateTime, entry: &RouterStatusEntry) {
        if let Some(column) = misfit(&[
            ("nickname", Some(entry.nickname.as_str()), NICKNAME_WIDTH),
            ("fingerprint", Some(entry.fingerprint.as_str()), HEX_ID_WIDTH),
            ("descriptor", Some(entry.descriptor_digest.as_str()), HEX_ID_WIDTH),
            ("version", entry.version.as_deref(), UNBOUNDED),
            ("ports", entry.ports.as_deref(), UNBOUNDED),
            ("rawdesc", Some(entry.raw.as_str()), UNBOUNDED),
        ]) {
            error!(
                "Not importing status entry {} of consensus {}: {} does not fit its column",
                entry.fingerprint, valid_after, column
            );
            return;
        }
        self.entries.push(StatusEntryRow {
            valid_after,
            nickname: entry.nickname.clone(),
            fingerprint: entry.fingerprint.clone(),
            descriptor: entry.descriptor_digest.clone(),
            published: entry.published,
            address: entry.address.to_string(),
            or_port: i32::from(entry.or_port),
            dir_port: i32::from(entry.dir_port),
            flags: entry.flags.iter().map(String::as_str).collect::<Vec<_>>().join(" "),
            version: entry.version.clone(),
            bandwidth: entry.bandwidth.and_then(|b| i64::try_from(b).ok()),
            ports: entry.ports.clone(),
            raw: entry.raw.clone(),
        });
    }

    fn add_server_descriptor(&mut self, descriptor: &ServerDescriptor) {
        if let Some(column) = misfit(&[
            ("descriptor", Some(descriptor.digest.as_str()), HEX_ID_WIDTH),
            ("nickname", Some(descriptor.nickname.as_str()), NICKNAME_WIDTH),
            ("address", Some(descriptor.address.as_str()), ADDRESS_WIDTH),
            ("fingerprint", descriptor.fingerprint.as_deref(), HEX_ID_WIDTH),
            ("platform", descriptor.platform.as_deref(), UNBOUNDED),
            ("extrainfo", descriptor.extra_info_digest.as_deref(), HEX_ID_WIDTH),
        ]) {
            error!(
                "Not importing server descriptor {}: {} does not fit its column",
                descriptor.digest, column
            );
            return;
        }
        let bandwidth = |value: u64| i64::try_from(value).ok();
        self.descriptors.push(DescriptorRow {
            digest: descriptor.digest.clone(),
            nickname: descriptor.nickname.clone(),
            address: descriptor.address.clone(),
            or_port: i32::from(descriptor.or_port),
            dir_port: i32::from(descriptor.dir_port),
            fingerprint: descriptor.fingerprint.clone(),
            bandwidth_avg: descriptor.bandwidth.and_then(|b| bandwidth(b.average)),
            bandwidth_burst: descriptor.bandwidth.and_then(|b| bandwidth(b.burst)),
            bandwidth_observed: descriptor.bandwidth.and_then(|b| bandwidth(b.observed)),
            platform: descriptor.platform.clone(),
            published: descriptor.published,
            uptime: descriptor.uptime.and_then(|u| i64::try_from(u).ok()),
            extra_info: descriptor.extra_info_digest.clone(),
        });
    }

    fn add_extra_info_descriptor(&mut self, descriptor: &ExtraInfoDescriptor) {
        let Some(digest) = descriptor.digest.clone() else {
            return;
        };
        if let Some(column) = misfit(&[
            ("extrainfo", Some(digest.as_str()), HEX_ID_WIDTH),
            ("nickname", Some(descriptor.nickname.as_str()), NICKNAME_WIDTH),
            ("fingerprint", Some(descriptor.fingerprint.as_str()), HEX_ID_WIDTH),
        ]) {
            error!(
                "Not importing extra-info descriptor {}: {} does not fit its column",
                digest, column
            );
            return;
        }
        self.extra_infos.push(ExtraInfoRow {
            digest,
            nickname: descriptor.nickname.clone(),
            fingerprint: descriptor.fingerprint.clone(),
            published: descriptor.published,
        });
        for ((history, interval_end), value) in &descriptor.bandwidth_history {
            let Ok(value) = i64::try_from(*value) else {
                continue;
            };
            self.histories.push(HistoryRow {
                fingerprint: descriptor.fingerprint.clone(),
                history: history.as_str(),
                interval_end: *interval_end,
                value,
            });
        }
    }
}

const TABLES: [&str; 6] = ["consensus", "vote", "statusentry", "descriptor", "extrainfo", "bwhist"];

/// Creates tables and indexes in the database if they don't already exist.
async fn create_tables(transaction: &Transaction<'_>) -> AnyhowResult<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS consensus (
            validafter TIMESTAMP WITHOUT TIME ZONE NOT NULL,
            dirsources TEXT NOT NULL,
            PRIMARY KEY(validafter)
        )",
        "CREATE TABLE IF NOT EXISTS vote (
            validafter TIMESTAMP WITHOUT TIME ZONE NOT NULL,
            dirsource CHARACTER(40) NOT NULL,
            digest CHARACTER(40),
            PRIMARY KEY(validafter, dirsource)
        )",
        "CREATE TABLE IF NOT EXISTS statusentry (
            validafter TIMESTAMP WITHOUT TIME ZONE NOT NULL,
            nickname CHARACTER VARYING(19) NOT NULL,
            fingerprint CHARACTER(40) NOT NULL,
            descriptor CHARACTER(40) NOT NULL,
            published TIMESTAMP WITHOUT TIME ZONE NOT NULL,
            address CHARACTER VARYING(15) NOT NULL,
            orport INTEGER NOT NULL,
            dirport INTEGER NOT NULL,
            flags TEXT NOT NULL,
            version TEXT,
            bandwidth BIGINT,
            ports TEXT,
            rawdesc TEXT NOT NULL,
            PRIMARY KEY(validafter, fingerprint)
        )",
        "CREATE INDEX IF NOT EXISTS statusentry_fingerprint ON statusentry (fingerprint)",
        "CREATE TABLE IF NOT EXISTS descriptor (
            descriptor CHARACTER(40) NOT NULL,
            nickname CHARACTER VARYING(19) NOT NULL,
            address CHARACTER VARYING(15) NOT NULL,
            orport INTEGER NOT NULL,
            dirport INTEGER NOT NULL,
            fingerprint CHARACTER(40),
            bandwidthavg BIGINT,
            bandwidthburst BIGINT,
            bandwidthobserved BIGINT,
            platform TEXT,
            published TIMESTAMP WITHOUT TIME ZONE NOT NULL,
            uptime BIGINT,
            extrainfo CHARACTER(40),
            PRIMARY KEY(descriptor)
        )",
        "CREATE TABLE IF NOT EXISTS extrainfo (
            extrainfo CHARACTER(40) NOT NULL,
            nickname CHARACTER VARYING(19) NOT NULL,
            fingerprint CHARACTER(40) NOT NULL,
            published TIMESTAMP WITHOUT TIME ZONE NOT NULL,
            PRIMARY KEY(extrainfo)
        )",
        "CREATE TABLE IF NOT EXISTS bwhist (
            fingerprint CHARACTER(40) NOT NULL,
            history TEXT NOT NULL,
            intervalend TIMESTAMP WITHOUT TIME ZONE NOT NULL,
            value BIGINT NOT NULL,
            PRIMARY KEY(fingerprint, history, intervalend)
        )",
        "CREATE INDEX IF NOT EXISTS bwhist_intervalend ON bwhist (intervalend)",
    ];
    for statement in statements {
        transaction
            .execute(statement, &[])
            .await
            .with_context(|| format!("Failed to execute '{}'", first_line(statement)))?;
    }
    Ok(())
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement)
}

/// Inserts rows in batches of at most [`BATCH_SIZE`], skipping rows whose key exists.
async fn insert_batched<R: Row>(transaction: &Transaction<'_>, rows: &[R]) -> AnyhowResult<()> {
    for batch in rows.chunks(BATCH_SIZE) {
        let params: Vec<SqlParam<'_>> = batch.iter().flat_map(Row::params).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT DO NOTHING",
            R::TABLE,
            R::COLUMNS.join(", "),
            placeholders(batch.len(), R::COLUMNS.len())
        );
        transaction
            .execute(sql.as_str(), &params)
            .await
            .with_context(|| format!("Failed to insert batch into {}", R::TABLE))?;
    }
    Ok(())
}

/// Builds `($1,$2),($3,$4),...` for `rows` rows of `columns` values each.
fn placeholders(rows: usize, columns: usize) -> String {
    (0..rows)
        .map(|row| {
            let base = row * columns;
            let values = (1..=columns)
                .map(|column| format!("${}", base + column))
                .collect::<Vec<_>>()
                .join(",");
            format!("({})", values)
        })
        .collect::<Vec<_>>()
        .join(",")
}
