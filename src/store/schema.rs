pub const SCHEMA: &str = r#"
-- Users are identities; tokens are just auth credentials for users
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT UNIQUE,
    name TEXT,
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- 8 char lookup embedded in the raw token
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT,                   -- NULL = never
    last_used_at TEXT
);

-- Collections are soft-deleted: deleted_at NULL means active
CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    deleted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS collection_members (
    id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('OWNER', 'EDITOR', 'VIEW_ONLY')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE(collection_id, user_id)
);

CREATE TABLE IF NOT EXISTS samples (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    title TEXT NOT NULL,
    material_type TEXT NOT NULL,
    deleted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Positions are 1-based and contiguous within a collection
CREATE TABLE IF NOT EXISTS collection_samples (
    collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    sample_id TEXT NOT NULL REFERENCES samples(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    added_at TEXT NOT NULL,
    PRIMARY KEY (collection_id, sample_id),
    UNIQUE(collection_id, position)
);

CREATE TABLE IF NOT EXISTS invites (
    id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    inviter_id TEXT NOT NULL REFERENCES users(id),
    invitee_user_id TEXT REFERENCES users(id),
    invitee_email TEXT,
    invitee_username TEXT,
    role TEXT NOT NULL CHECK (role IN ('EDITOR', 'VIEW_ONLY')),
    token TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'PENDING'
        CHECK (status IN ('PENDING', 'ACCEPTED', 'REJECTED', 'EXPIRED')),
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Append-only
CREATE TABLE IF NOT EXISTS audit_logs (
    id TEXT PRIMARY KEY,
    actor_id TEXT NOT NULL,
    action TEXT NOT NULL,
    collection_id TEXT,
    target_user_id TEXT,
    invite_id TEXT,
    metadata TEXT,                     -- JSON object
    created_at TEXT NOT NULL
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);
CREATE INDEX IF NOT EXISTS idx_collections_user ON collections(user_id);
CREATE INDEX IF NOT EXISTS idx_members_user ON collection_members(user_id);
CREATE INDEX IF NOT EXISTS idx_samples_user ON samples(user_id);
CREATE INDEX IF NOT EXISTS idx_collection_samples_sample ON collection_samples(sample_id);
CREATE INDEX IF NOT EXISTS idx_invites_inviter_created ON invites(inviter_id, created_at);
CREATE INDEX IF NOT EXISTS idx_invites_status_expires ON invites(status, expires_at);
CREATE INDEX IF NOT EXISTS idx_audit_logs_collection ON audit_logs(collection_id);
CREATE INDEX IF NOT EXISTS idx_audit_logs_invite ON audit_logs(invite_id);
"#;
