pub const CHECKPOINTS_TABLE: &str = "checkpoints";
pub const THREADS_TABLE: &str = "threads";
pub const MESSAGES_TABLE: &str = "messages";
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_CHECKPOINTS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS checkpoints (\
    thread_id TEXT NOT NULL,\
    seq BIGINT NOT NULL,\
    created_at TEXT NOT NULL,\
    node TEXT,\
    step BIGINT,\
    state_json TEXT NOT NULL,\
    PRIMARY KEY (thread_id, seq)\
)";

pub const CREATE_THREADS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS threads (\
    thread_id TEXT PRIMARY KEY,\
    created_at TEXT NOT NULL,\
    updated_at TEXT NOT NULL\
)";

pub const CREATE_MESSAGES_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS messages (\
    thread_id TEXT NOT NULL,\
    seq BIGINT NOT NULL,\
    role TEXT NOT NULL,\
    content TEXT NOT NULL,\
    name TEXT,\
    created_at TEXT,\
    PRIMARY KEY (thread_id, seq)\
)";

pub const MIGRATION_STATEMENTS_SQL: [&str; 3] = [
    CREATE_CHECKPOINTS_TABLE_SQL,
    CREATE_THREADS_TABLE_SQL,
    CREATE_MESSAGES_TABLE_SQL,
];

pub const INSERT_CHECKPOINT_SQL: &str = "INSERT INTO checkpoints \
    (thread_id, seq, created_at, node, step, state_json) \
    SELECT $1, COALESCE(MAX(seq), 0) + 1, $2, $3, $4, $5 \
    FROM checkpoints WHERE thread_id = $1 \
    RETURNING seq";

pub const SELECT_LATEST_CHECKPOINT_SQL: &str = "SELECT thread_id, seq, created_at, node, step, state_json \
    FROM checkpoints WHERE thread_id = $1 ORDER BY seq DESC LIMIT 1";

pub const SELECT_CHECKPOINT_HISTORY_SQL: &str = "SELECT seq, created_at, node, step \
    FROM checkpoints WHERE thread_id = $1 ORDER BY seq";

pub const UPSERT_THREAD_SQL: &str = "INSERT INTO threads (thread_id, created_at, updated_at) \
    VALUES ($1, $2, $2) \
    ON CONFLICT (thread_id) DO UPDATE SET updated_at = excluded.updated_at";

pub const DELETE_MESSAGES_SQL: &str = "DELETE FROM messages WHERE thread_id = $1";

pub const INSERT_MESSAGE_SQL: &str = "INSERT INTO messages \
    (thread_id, seq, role, content, name, created_at) \
    VALUES ($1, $2, $3, $4, $5, $6)";
