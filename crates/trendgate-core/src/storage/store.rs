use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::schema::{DDL, SCHEMA_VERSION};
use super::{decode_timestamp, encode_timestamp, BaselineQuery, MetricsStore};
use crate::errors::{codes, Error, Result, StorageErrorKind};
use crate::model::{
    BuildContext, BuildId, BuildRecord, CollectedMetric, DataPoint, MetricDefinition, MetricId,
    MetricSpec, MetricType, MetricValue, MetricValueRecord, TimeSeriesData,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of [`SqliteStore::record_run`].
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub build_id: BuildId,
    pub definitions: Vec<MetricDefinition>,
}

/// SQLite-backed metrics store.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a file-backed store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| {
            Error::storage(
                StorageErrorKind::Connection,
                format!("failed to open {}: {}", path.display(), e),
            )
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init_connection(&conn)?;
        tracing::debug!(path = %path.display(), "opened metrics store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store (tests, dry runs).
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(Error::storage(
                StorageErrorKind::Corrupted,
                format!(
                    "database schema version {} is newer than supported version {}",
                    version, SCHEMA_VERSION
                ),
            ));
        }

        conn.execute_batch(DDL)?;
        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::storage(StorageErrorKind::Io, "store connection mutex poisoned"))
    }

    /// Record a build and all of its collected values in one transaction. Any failing step
    /// rolls back the whole run.
    pub fn record_run(
        &self,
        context: &BuildContext,
        collected: &[CollectedMetric],
    ) -> Result<RecordedRun> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let build_id = insert_build(&tx, context)?;
        let mut seen = HashSet::new();
        let mut definitions = Vec::with_capacity(collected.len());
        for metric in collected {
            if !seen.insert(metric.definition.name.as_str()) {
                return Err(Error::invalid_field(
                    codes::DUPLICATE_METRIC,
                    metric.definition.name.clone(),
                    format!(
                        "metric `{}` was collected twice for one run",
                        metric.definition.name
                    ),
                ));
            }
            let definition = find_or_create_definition(&tx, &metric.definition)?;
            insert_value(&tx, &definition, build_id, &metric.value)?;
            definitions.push(definition);
        }

        tx.commit()?;
        tracing::info!(
            build_id,
            branch = %context.branch,
            commit = %context.commit_sha,
            metrics = definitions.len(),
            "recorded run"
        );
        Ok(RecordedRun {
            build_id,
            definitions,
        })
    }
}

impl MetricsStore for SqliteStore {
    fn record_build(&self, context: &BuildContext) -> Result<BuildId> {
        let conn = self.lock()?;
        insert_build(&conn, context)
    }

    fn upsert_definition(&self, spec: &MetricSpec) -> Result<MetricDefinition> {
        let conn = self.lock()?;
        find_or_create_definition(&conn, spec)
    }

    fn record_value(
        &self,
        metric_id: MetricId,
        build_id: BuildId,
        value: &MetricValue,
    ) -> Result<MetricValueRecord> {
        let conn = self.lock()?;
        let definition = definition_by_id(&conn, metric_id)?
            .ok_or_else(|| Error::not_found("metric", format!("id {}", metric_id)))?;
        insert_value(&conn, &definition, build_id, value)
    }

    fn query_baseline(&self, query: &BaselineQuery<'_>) -> Result<Vec<f64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT v.value_numeric
             FROM metric_values v
             JOIN metric_definitions d ON d.id = v.metric_id
             JOIN builds b ON b.id = v.build_id
             WHERE d.name = ?1
               AND b.branch = ?2
               AND b.timestamp >= ?3
               AND v.value_numeric IS NOT NULL
               AND (?4 IS NULL OR b.id <> ?4)
             ORDER BY b.timestamp DESC, b.id DESC
             LIMIT ?5",
        )?;
        let values = stmt
            .query_map(
                params![
                    query.metric,
                    query.branch,
                    encode_timestamp(&query.cutoff()),
                    query.exclude_build,
                    i64::from(query.max_builds),
                ],
                |row| row.get::<_, f64>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tracing::debug!(
            metric = query.metric,
            branch = query.branch,
            max_builds = query.max_builds,
            max_age_days = query.max_age_days,
            found = values.len(),
            "baseline query"
        );
        Ok(values)
    }

    fn query_time_series(&self, metric: &str) -> Result<TimeSeriesData> {
        let conn = self.lock()?;
        let definition = definition_by_name(&conn, metric)?
            .ok_or_else(|| Error::not_found("metric", metric))?;

        let mut stmt = conn.prepare(
            "SELECT b.timestamp, v.value_numeric, v.value_label, b.commit_sha, b.branch, b.run_number
             FROM metric_values v
             JOIN builds b ON b.id = v.build_id
             WHERE v.metric_id = ?1
             ORDER BY b.timestamp ASC, b.id ASC",
        )?;
        let rows = stmt
            .query_map(params![definition.id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut series = TimeSeriesData::empty(&definition);
        for (timestamp, numeric, label, commit_sha, branch, run_number) in rows {
            series.data_points.push(DataPoint {
                timestamp: parse_stored_timestamp(&timestamp)?,
                value: Some(value_from_columns(metric, numeric, label)?),
                commit_sha,
                branch,
                run_number: run_number_from_db(run_number)?,
            });
        }
        Ok(series)
    }

    fn list_definitions(&self) -> Result<Vec<MetricDefinition>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, type, unit, description FROM metric_definitions ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map([], definition_columns)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(definition_from_columns).collect()
    }

    fn list_builds(&self, branch: Option<&str>) -> Result<Vec<BuildRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, commit_sha, branch, run_id, run_number, timestamp
             FROM builds
             WHERE (?1 IS NULL OR branch = ?1)
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![branch], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, commit_sha, branch, run_id, run_number, timestamp)| {
                Ok(BuildRecord {
                    id,
                    context: BuildContext {
                        commit_sha,
                        branch,
                        run_id,
                        run_number: run_number_from_db(run_number)?,
                        timestamp: parse_stored_timestamp(&timestamp)?,
                    },
                })
            })
            .collect()
    }
}

fn insert_build(conn: &Connection, context: &BuildContext) -> Result<BuildId> {
    context.validate()?;
    let run_number = i64::try_from(context.run_number).map_err(|_| {
        Error::invalid_field(
            codes::INVALID_ARGUMENT,
            "run_number",
            format!("run number {} is out of range", context.run_number),
        )
    })?;
    conn.execute(
        "INSERT INTO builds(commit_sha, branch, run_id, run_number, timestamp, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            context.commit_sha,
            context.branch,
            context.run_id,
            run_number,
            encode_timestamp(&context.timestamp),
            encode_timestamp(&Utc::now()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn find_or_create_definition(conn: &Connection, spec: &MetricSpec) -> Result<MetricDefinition> {
    let name = spec.name.trim();
    if name.is_empty() {
        return Err(Error::missing_field("name"));
    }

    if let Some(existing) = definition_by_name(conn, name)? {
        if existing.metric_type != spec.metric_type {
            return Err(Error::invalid_field(
                codes::METRIC_TYPE_CONFLICT,
                name,
                format!(
                    "metric `{}` is stored as {} and cannot be recorded as {}",
                    name, existing.metric_type, spec.metric_type
                ),
            ));
        }
        let unit_differs = spec.unit.is_some() && spec.unit != existing.unit;
        let description_differs =
            spec.description.is_some() && spec.description != existing.description;
        if unit_differs || description_differs {
            tracing::warn!(
                metric = name,
                stored_unit = ?existing.unit,
                given_unit = ?spec.unit,
                "metric definition differs from stored one; keeping stored definition"
            );
        }
        return Ok(existing);
    }

    conn.execute(
        "INSERT INTO metric_definitions(name, type, unit, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            name,
            spec.metric_type.as_str(),
            spec.unit,
            spec.description,
            encode_timestamp(&Utc::now()),
        ],
    )?;
    tracing::debug!(metric = name, kind = %spec.metric_type, "created metric definition");

    Ok(MetricDefinition {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        metric_type: spec.metric_type,
        unit: spec.unit.clone(),
        description: spec.description.clone(),
    })
}

fn insert_value(
    conn: &Connection,
    definition: &MetricDefinition,
    build_id: BuildId,
    value: &MetricValue,
) -> Result<MetricValueRecord> {
    if value.metric_type() != definition.metric_type {
        return Err(Error::invalid_field(
            codes::VALUE_TYPE_MISMATCH,
            definition.name.clone(),
            format!(
                "metric `{}` is {} but received a {} value",
                definition.name,
                definition.metric_type,
                value.metric_type()
            ),
        ));
    }
    value.validate(&definition.name)?;

    let build_exists = conn
        .query_row("SELECT 1 FROM builds WHERE id = ?1", params![build_id], |_| Ok(()))
        .optional()?
        .is_some();
    if !build_exists {
        return Err(Error::not_found("build", format!("id {}", build_id)));
    }

    let duplicate = conn
        .query_row(
            "SELECT 1 FROM metric_values WHERE metric_id = ?1 AND build_id = ?2",
            params![definition.id, build_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if duplicate {
        return Err(Error::invalid_field(
            codes::DUPLICATE_VALUE,
            definition.name.clone(),
            format!(
                "build {} already has a value for metric `{}`",
                build_id, definition.name
            ),
        ));
    }

    let collected_at = Utc::now();
    let (numeric, label) = match value {
        MetricValue::Numeric(v) => (Some(*v), None),
        MetricValue::Label(s) => (None, Some(s.as_str())),
    };
    conn.execute(
        "INSERT INTO metric_values(metric_id, build_id, value_numeric, value_label, collected_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            definition.id,
            build_id,
            numeric,
            label,
            encode_timestamp(&collected_at)
        ],
    )?;

    Ok(MetricValueRecord {
        metric_id: definition.id,
        build_id,
        value: value.clone(),
        collected_at,
    })
}

type DefinitionColumns = (i64, String, String, Option<String>, Option<String>);

fn definition_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<DefinitionColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn definition_from_columns(
    (id, name, kind, unit, description): DefinitionColumns,
) -> Result<MetricDefinition> {
    let metric_type = MetricType::parse(&kind).ok_or_else(|| {
        Error::storage(
            StorageErrorKind::Corrupted,
            format!("metric `{}` has unknown type `{}`", name, kind),
        )
    })?;
    Ok(MetricDefinition {
        id,
        name,
        metric_type,
        unit,
        description,
    })
}

fn definition_by_name(conn: &Connection, name: &str) -> Result<Option<MetricDefinition>> {
    conn.query_row(
        "SELECT id, name, type, unit, description FROM metric_definitions WHERE name = ?1",
        params![name],
        definition_columns,
    )
    .optional()?
    .map(definition_from_columns)
    .transpose()
}

fn definition_by_id(conn: &Connection, id: MetricId) -> Result<Option<MetricDefinition>> {
    conn.query_row(
        "SELECT id, name, type, unit, description FROM metric_definitions WHERE id = ?1",
        params![id],
        definition_columns,
    )
    .optional()?
    .map(definition_from_columns)
    .transpose()
}

fn value_from_columns(
    metric: &str,
    numeric: Option<f64>,
    label: Option<String>,
) -> Result<MetricValue> {
    match (numeric, label) {
        (Some(v), None) => Ok(MetricValue::Numeric(v)),
        (None, Some(s)) => Ok(MetricValue::Label(s)),
        _ => Err(Error::storage(
            StorageErrorKind::Corrupted,
            format!("metric `{}` has a row with both or neither value columns", metric),
        )),
    }
}

fn parse_stored_timestamp(raw: &str) -> Result<chrono::DateTime<Utc>> {
    decode_timestamp(raw).ok_or_else(|| {
        Error::storage(
            StorageErrorKind::Corrupted,
            format!("unreadable build timestamp `{}`", raw),
        )
    })
}

fn run_number_from_db(raw: i64) -> Result<u64> {
    u64::try_from(raw).map_err(|_| {
        Error::storage(
            StorageErrorKind::Corrupted,
            format!("negative run number {}", raw),
        )
    })
}
