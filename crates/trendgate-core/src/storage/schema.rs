/// Bumped whenever the DDL below changes shape. Stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS builds (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  commit_sha TEXT NOT NULL,
  branch TEXT NOT NULL,
  run_id TEXT NOT NULL,
  run_number INTEGER NOT NULL,
  timestamp TEXT NOT NULL,   -- RFC 3339, UTC, fixed nanosecond width (sorts lexically)
  recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS metric_definitions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE,
  type TEXT NOT NULL CHECK (type IN ('numeric', 'label')),
  unit TEXT,
  description TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS metric_values (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  metric_id INTEGER NOT NULL REFERENCES metric_definitions(id),
  build_id INTEGER NOT NULL REFERENCES builds(id),
  value_numeric REAL,
  value_label TEXT,
  collected_at TEXT NOT NULL,
  UNIQUE (metric_id, build_id),
  CHECK ((value_numeric IS NULL) <> (value_label IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_builds_branch_time ON builds(branch, timestamp);
CREATE INDEX IF NOT EXISTS idx_values_build ON metric_values(build_id);
"#;
